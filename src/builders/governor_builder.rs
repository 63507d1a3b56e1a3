//! Build the process-wide dispatch governor from configuration.

use std::sync::Arc;

use crate::config::{ProviderProfile, RegistryConfig};
use crate::core::{DispatchGovernor, RegistryError, SenderIdentity, Spawn, Transport};

/// Builder that selects a transport once and starts the governor on it.
#[derive(Debug, Clone)]
pub struct GovernorBuilder {
    config: RegistryConfig,
}

impl GovernorBuilder {
    /// Create a builder from validated configuration.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        config
            .validate()
            .map_err(|e| RegistryError::Config(format!("config invalid: {e}")))?;
        Ok(Self { config })
    }

    /// Access the configuration.
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Provider profile the transport would use, if any.
    pub fn profile(&self) -> Option<ProviderProfile> {
        self.config.transport.select()
    }

    /// Sender identity for the selected profile.
    pub fn sender(&self) -> SenderIdentity {
        self.config.transport.sender_identity(self.profile().as_ref())
    }

    /// Start a governor around an explicit transport.
    pub fn build_with_transport<S: Spawn>(
        &self,
        transport: Arc<dyn Transport>,
        spawner: &S,
    ) -> DispatchGovernor {
        tracing::info!(
            "mail governor using {} ({} per minute, {}ms apart)",
            transport.name(),
            self.config.governor.max_per_minute,
            self.config.governor.min_interval_ms
        );
        DispatchGovernor::start(
            self.config.governor.clone(),
            self.sender(),
            transport,
            spawner,
        )
    }

    /// Start a governor on the SMTP profile chosen by the configuration.
    ///
    /// Without credentials the governor is disabled and every send reports
    /// [`crate::core::DispatchError::TransportDisabled`].
    #[cfg(feature = "smtp")]
    pub fn build<S: Spawn>(&self, spawner: &S) -> DispatchGovernor {
        let Some(profile) = self.profile() else {
            tracing::warn!("no mail credentials configured; outbound mail disabled");
            return DispatchGovernor::disabled();
        };
        match crate::infra::transport::SmtpTransport::from_profile(&profile) {
            Ok(transport) => self.build_with_transport(Arc::new(transport), spawner),
            Err(e) => {
                tracing::error!("smtp transport for {} unavailable: {}", profile.host, e);
                DispatchGovernor::disabled()
            }
        }
    }

    /// Without the `smtp` feature no transport can be built.
    #[cfg(not(feature = "smtp"))]
    pub fn build<S: Spawn>(&self, _spawner: &S) -> DispatchGovernor {
        tracing::warn!("built without smtp support; outbound mail disabled");
        DispatchGovernor::disabled()
    }
}
