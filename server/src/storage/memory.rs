use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use async_trait::async_trait;

use super::{object_key, CredentialStore, StoreError, StoredCredential};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Keeps credential objects in process memory
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    prefix: String,
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    puts: Arc<AtomicUsize>,
}

impl MemoryCredentialStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of writes performed, including overwrites
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, record: &StoredCredential) -> Result<(), StoreError> {
        let key = object_key(&self.prefix, &record.user_id)?;
        let object = StoredObject {
            body: record.to_json()?,
            content_type: mime::APPLICATION_JSON.to_string(),
        };

        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, object);
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn location(&self) -> String {
        format!("memory://{}", self.prefix)
    }
}
