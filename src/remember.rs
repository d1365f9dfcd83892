use std::sync::Arc;

use crate::error::StorageError;
use crate::models::RememberedIdentity;
use crate::storage::KeyValueStore;

pub const EMAIL_KEY: &str = "rememberedEmail";
pub const COLLEGE_KEY: &str = "rememberedCollege";
pub const DEPARTMENT_KEY: &str = "rememberedDepartment";

/// Initial form state for the login screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefill {
    pub identity: Option<RememberedIdentity>,
    pub remember_me: bool,
}

pub struct RememberMeStore {
    store: Arc<dyn KeyValueStore>,
}

impl RememberMeStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Called at submit time with the current toggle value.
    pub fn apply(&self, remember: bool, identity: &RememberedIdentity) -> Result<(), StorageError> {
        if remember {
            self.save(identity)
        } else {
            self.clear()
        }
    }

    pub fn save(&self, identity: &RememberedIdentity) -> Result<(), StorageError> {
        self.store.set(EMAIL_KEY, &identity.email)?;
        write_optional(self.store.as_ref(), COLLEGE_KEY, identity.college.as_deref())?;
        write_optional(self.store.as_ref(), DEPARTMENT_KEY, identity.department.as_deref())?;
        tracing::debug!("Remembered identity saved for {}", identity.email);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(EMAIL_KEY)?;
        self.store.remove(COLLEGE_KEY)?;
        self.store.remove(DEPARTMENT_KEY)?;
        tracing::debug!("Remembered identity cleared");
        Ok(())
    }

    pub fn load(&self) -> Result<Prefill, StorageError> {
        let email = non_empty(self.store.get(EMAIL_KEY)?);
        let college = non_empty(self.store.get(COLLEGE_KEY)?);
        let department = non_empty(self.store.get(DEPARTMENT_KEY)?);

        if email.is_none() && college.is_none() && department.is_none() {
            return Ok(Prefill::default());
        }

        Ok(Prefill {
            identity: Some(RememberedIdentity {
                email: email.unwrap_or_default(),
                college,
                department,
            }),
            remember_me: true,
        })
    }
}

fn write_optional(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&str>,
) -> Result<(), StorageError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => store.set(key, value),
        None => store.remove(key),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use uuid::Uuid;

    fn identity() -> RememberedIdentity {
        RememberedIdentity {
            email: "a@b.com".to_string(),
            college: Some("X".to_string()),
            department: None,
        }
    }

    #[test]
    fn round_trip_through_fresh_session() {
        let path = std::env::temp_dir()
            .join(format!("campus-portal-{}", Uuid::new_v4()))
            .join("state.json");

        RememberMeStore::new(Arc::new(FileStore::new(&path)))
            .apply(true, &identity())
            .unwrap();

        let prefill = RememberMeStore::new(Arc::new(FileStore::new(&path)))
            .load()
            .unwrap();
        assert!(prefill.remember_me);
        assert_eq!(prefill.identity, Some(identity()));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn disabling_toggle_clears_all_keys() {
        let store = Arc::new(MemoryStore::new());
        let remember = RememberMeStore::new(store.clone());
        remember
            .save(&RememberedIdentity {
                department: Some("Physics".to_string()),
                ..identity()
            })
            .unwrap();

        remember.apply(false, &identity()).unwrap();
        for key in [EMAIL_KEY, COLLEGE_KEY, DEPARTMENT_KEY] {
            assert_eq!(store.get(key).unwrap(), None);
        }
        assert_eq!(remember.load().unwrap(), Prefill::default());
    }

    #[test]
    fn nothing_remembered_leaves_toggle_off() {
        let remember = RememberMeStore::new(Arc::new(MemoryStore::new()));
        let prefill = remember.load().unwrap();
        assert!(!prefill.remember_me);
        assert!(prefill.identity.is_none());
    }

    #[test]
    fn saving_overwrites_stale_optional_fields() {
        let store = Arc::new(MemoryStore::new());
        let remember = RememberMeStore::new(store.clone());
        remember
            .save(&RememberedIdentity {
                department: Some("Physics".to_string()),
                ..identity()
            })
            .unwrap();
        remember.save(&identity()).unwrap();
        assert_eq!(store.get(DEPARTMENT_KEY).unwrap(), None);
    }
}
