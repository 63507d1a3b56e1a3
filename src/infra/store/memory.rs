//! In-memory registry store.
//!
//! All state sits behind one mutex, so every trait operation is atomic with
//! respect to the others. Suitable for tests and single-process deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::{
    HolderKey, IncrementOutcome, NewSkill, RegistryError, RegistryStore, Skill, SkillFilter,
    Student, StudentPatch,
};

#[derive(Default)]
struct Inner {
    students: BTreeMap<String, Student>,
    skills: BTreeMap<String, Skill>,
}

impl Inner {
    fn holder_mut(&mut self, key: &HolderKey) -> Option<&mut Student> {
        match key {
            HolderKey::Matric(matric) => self.students.get_mut(matric),
            HolderKey::Email(email) => self
                .students
                .values_mut()
                .find(|s| s.email.as_deref() == Some(email.as_str())),
        }
    }

    fn email_owner(&self, email: &str) -> Option<&str> {
        self.students
            .values()
            .find(|s| s.email.as_deref() == Some(email))
            .map(|s| s.matric_number.as_str())
    }
}

/// In-memory store keyed by matric number and skill code.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of students on file.
    pub fn holder_count(&self) -> usize {
        self.inner.lock().students.len()
    }
}

fn blank_student(matric: &str) -> Student {
    Student {
        matric_number: matric.to_string(),
        name: String::new(),
        department: None,
        faculty: None,
        phone: None,
        email: None,
        email_verified: false,
        skills: Vec::new(),
        otp: None,
        otp_expires: None,
        carry_over: false,
        course_code: None,
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn find_holder(&self, key: &HolderKey) -> Result<Option<Student>, RegistryError> {
        Ok(self.inner.lock().holder_mut(key).map(|s| s.clone()))
    }

    async fn upsert_holder(
        &self,
        matric: &str,
        patch: StudentPatch,
    ) -> Result<Student, RegistryError> {
        let mut inner = self.inner.lock();
        if let Some(email) = patch.email.as_deref() {
            if inner.email_owner(email).is_some_and(|owner| owner != matric) {
                return Err(RegistryError::EmailInUse);
            }
        }
        let student = inner
            .students
            .entry(matric.to_string())
            .or_insert_with(|| blank_student(matric));

        if let Some(name) = patch.name {
            student.name = name;
        }
        if patch.department.is_some() {
            student.department = patch.department;
        }
        if patch.faculty.is_some() {
            student.faculty = patch.faculty;
        }
        if patch.phone.is_some() {
            student.phone = patch.phone;
        }
        if let Some(email) = patch.email {
            if student.email.as_deref() != Some(email.as_str()) {
                student.email = Some(email);
                student.email_verified = false;
                student.otp = None;
                student.otp_expires = None;
            }
        }
        if let Some(carry_over) = patch.carry_over {
            student.carry_over = carry_over;
        }
        if patch.course_code.is_some() {
            student.course_code = patch.course_code;
        }
        Ok(student.clone())
    }

    async fn set_otp(
        &self,
        key: &HolderKey,
        otp: &str,
        expires: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let mut inner = self.inner.lock();
        let Some(student) = inner.holder_mut(key) else {
            return Ok(false);
        };
        student.otp = Some(otp.to_string());
        student.otp_expires = Some(expires);
        Ok(true)
    }

    async fn mark_verified(&self, key: &HolderKey) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let student = inner
            .holder_mut(key)
            .ok_or_else(|| RegistryError::student_not_found(key.as_str()))?;
        student.email_verified = true;
        student.otp = None;
        student.otp_expires = None;
        Ok(())
    }

    async fn assign_resources(
        &self,
        matric: &str,
        codes: &[String],
    ) -> Result<bool, RegistryError> {
        let mut inner = self.inner.lock();
        let student = inner
            .students
            .get_mut(matric)
            .ok_or_else(|| RegistryError::student_not_found(matric))?;
        if student.is_registered() {
            return Ok(false);
        }
        student.skills = codes.to_vec();
        Ok(true)
    }

    async fn release_resources(
        &self,
        matric: &str,
        codes: &[String],
    ) -> Result<Vec<String>, RegistryError> {
        let mut inner = self.inner.lock();
        let student = inner
            .students
            .get_mut(matric)
            .ok_or_else(|| RegistryError::student_not_found(matric))?;
        let (removed, kept): (Vec<String>, Vec<String>) = student
            .skills
            .drain(..)
            .partition(|code| codes.contains(code));
        student.skills = kept;
        Ok(removed)
    }

    async fn holders_with_resources(
        &self,
        codes: &[String],
    ) -> Result<Vec<Student>, RegistryError> {
        Ok(self
            .inner
            .lock()
            .students
            .values()
            .filter(|s| s.skills.iter().any(|c| codes.contains(c)))
            .cloned()
            .collect())
    }

    async fn find_resource(&self, code: &str) -> Result<Option<Skill>, RegistryError> {
        Ok(self.inner.lock().skills.get(code).cloned())
    }

    async fn conditional_increment(&self, code: &str) -> Result<IncrementOutcome, RegistryError> {
        let mut inner = self.inner.lock();
        let Some(skill) = inner.skills.get_mut(code) else {
            return Ok(IncrementOutcome::Missing);
        };
        if skill.selected_count >= skill.max_selection {
            return Ok(IncrementOutcome::Full);
        }
        skill.selected_count += 1;
        Ok(IncrementOutcome::Reserved(skill.clone()))
    }

    async fn decrement(&self, code: &str, by: u32) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let skill = inner
            .skills
            .get_mut(code)
            .ok_or_else(|| RegistryError::skill_not_found(code))?;
        skill.selected_count = skill.selected_count.saturating_sub(by);
        Ok(())
    }

    async fn list_resources(&self, filter: SkillFilter) -> Result<Vec<Skill>, RegistryError> {
        Ok(self
            .inner
            .lock()
            .skills
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn upsert_resource(&self, skill: NewSkill) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let selected_count = inner
            .skills
            .get(&skill.code)
            .map_or(0, |s| s.selected_count);
        if skill.max_selection < selected_count {
            tracing::warn!(
                "{} already has {} selection(s); keeping max selection at {} instead of {}",
                skill.code,
                selected_count,
                selected_count,
                skill.max_selection
            );
        }
        inner.skills.insert(
            skill.code.clone(),
            Skill {
                code: skill.code,
                description: skill.description,
                trainer: skill.trainer,
                phone: skill.phone,
                max_selection: skill.max_selection.max(selected_count),
                selected_count,
                hidden: skill.hidden,
            },
        );
        Ok(())
    }

    async fn hide_by_description(&self, description: &str) -> Result<u64, RegistryError> {
        let wanted = description.trim().to_lowercase();
        let mut matched = 0;
        for skill in self.inner.lock().skills.values_mut() {
            if skill.description.trim().to_lowercase() == wanted {
                skill.hidden = true;
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn replace_limit(&self, from: u32, to: u32) -> Result<u64, RegistryError> {
        let mut changed = 0;
        for skill in self.inner.lock().skills.values_mut() {
            if skill.max_selection == from && skill.selected_count <= to {
                skill.max_selection = to;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn clear_holders(&self) -> Result<u64, RegistryError> {
        let mut inner = self.inner.lock();
        let removed = inner.students.len() as u64;
        inner.students.clear();
        Ok(removed)
    }

    async fn clear_resources(&self) -> Result<u64, RegistryError> {
        let mut inner = self.inner.lock();
        let removed = inner.skills.len() as u64;
        inner.skills.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(code: &str, max: u32) -> NewSkill {
        NewSkill {
            code: code.into(),
            description: format!("{code} training"),
            trainer: None,
            phone: None,
            max_selection: max,
            hidden: false,
        }
    }

    #[tokio::test]
    async fn test_increment_stops_at_capacity() {
        let store = InMemoryStore::new();
        store.upsert_resource(skill("A", 1)).await.unwrap();
        assert!(matches!(
            store.conditional_increment("A").await.unwrap(),
            IncrementOutcome::Reserved(s) if s.selected_count == 1
        ));
        assert_eq!(
            store.conditional_increment("A").await.unwrap(),
            IncrementOutcome::Full
        );
        assert_eq!(
            store.conditional_increment("B").await.unwrap(),
            IncrementOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let store = InMemoryStore::new();
        store.upsert_resource(skill("A", 3)).await.unwrap();
        store.conditional_increment("A").await.unwrap();
        store.decrement("A", 5).await.unwrap();
        assert_eq!(store.find_resource("A").await.unwrap().unwrap().selected_count, 0);
    }

    #[tokio::test]
    async fn test_upsert_resource_keeps_count() {
        let store = InMemoryStore::new();
        store.upsert_resource(skill("A", 3)).await.unwrap();
        store.conditional_increment("A").await.unwrap();
        store.upsert_resource(skill("A", 10)).await.unwrap();
        let a = store.find_resource("A").await.unwrap().unwrap();
        assert_eq!((a.max_selection, a.selected_count), (10, 1));
    }

    #[tokio::test]
    async fn test_limits_never_drop_below_count() {
        let store = InMemoryStore::new();
        store.upsert_resource(skill("A", 3)).await.unwrap();
        store.upsert_resource(skill("B", 3)).await.unwrap();
        for _ in 0..3 {
            store.conditional_increment("A").await.unwrap();
        }

        assert_eq!(store.replace_limit(3, 1).await.unwrap(), 1);
        let a = store.find_resource("A").await.unwrap().unwrap();
        assert_eq!((a.max_selection, a.selected_count), (3, 3));

        store.upsert_resource(skill("A", 2)).await.unwrap();
        let a = store.find_resource("A").await.unwrap().unwrap();
        assert_eq!((a.max_selection, a.selected_count), (3, 3));
    }

    #[tokio::test]
    async fn test_email_is_unique() {
        let store = InMemoryStore::new();
        let with_email = |e: &str| StudentPatch {
            email: Some(e.into()),
            ..StudentPatch::default()
        };
        store.upsert_holder("M1", with_email("a@x.com")).await.unwrap();
        assert_eq!(
            store.upsert_holder("M2", with_email("a@x.com")).await,
            Err(RegistryError::EmailInUse)
        );
        assert!(store.upsert_holder("M1", with_email("a@x.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_changing_email_clears_verification() {
        let store = InMemoryStore::new();
        let key = HolderKey::Matric("M1".into());
        store
            .upsert_holder("M1", StudentPatch { email: Some("a@x.com".into()), ..StudentPatch::default() })
            .await
            .unwrap();
        store.mark_verified(&key).await.unwrap();
        let student = store
            .upsert_holder("M1", StudentPatch { email: Some("b@x.com".into()), ..StudentPatch::default() })
            .await
            .unwrap();
        assert!(!student.email_verified);
    }

    #[tokio::test]
    async fn test_assign_only_once() {
        let store = InMemoryStore::new();
        store.upsert_holder("M1", StudentPatch::default()).await.unwrap();
        assert!(store.assign_resources("M1", &["A".into()]).await.unwrap());
        assert!(!store.assign_resources("M1", &["B".into()]).await.unwrap());
        let held = store.find_holder(&HolderKey::Matric("M1".into())).await.unwrap().unwrap();
        assert_eq!(held.skills, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_release_returns_removed_codes() {
        let store = InMemoryStore::new();
        store.upsert_holder("M1", StudentPatch::default()).await.unwrap();
        store
            .assign_resources("M1", &["A".into(), "B".into()])
            .await
            .unwrap();
        let removed = store.release_resources("M1", &["B".into(), "C".into()]).await.unwrap();
        assert_eq!(removed, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_hide_matches_case_insensitively() {
        let store = InMemoryStore::new();
        store.upsert_resource(skill("A", 3)).await.unwrap();
        assert_eq!(store.hide_by_description("a TRAINING").await.unwrap(), 1);
        assert!(store.list_resources(SkillFilter::Visible).await.unwrap().is_empty());
        assert_eq!(store.list_resources(SkillFilter::Hidden).await.unwrap().len(), 1);
    }
}
