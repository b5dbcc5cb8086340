//! Runtime context shared by the dispatcher and every handler.

use crate::shutdown::Shutdown;
use crate::stats::StatsStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Client name under which the group directory is registered.
pub const GROUP_DIRECTORY_CLIENT: &str = "groups";

/// Failure looking up a dotted path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("At least one dot separated component must be provided")]
    EmptyPath,
    #[error("Key '{0}' not found")]
    Missing(String),
    #[error("Can not extract key '{0}' from non-mapping")]
    NotAMapping(String),
}

/// Look up a dot separated path inside a configuration tree.
pub fn extract<'a>(root: &'a Value, path: &str) -> Result<&'a Value, LookupError> {
    if path.is_empty() {
        return Err(LookupError::EmptyPath);
    }
    let mut node = root;
    for key in path.split('.') {
        let map = node
            .as_object()
            .ok_or_else(|| LookupError::NotAMapping(key.to_string()))?;
        node = map
            .get(key)
            .ok_or_else(|| LookupError::Missing(key.to_string()))?;
    }
    Ok(node)
}

/// Interpret a configuration value as an on/off switch.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "t" | "true" | "on" | "y" | "yes"
        ),
        _ => false,
    }
}

/// Secret values grouped by section.
#[derive(Default, Clone)]
pub struct Secrets {
    sections: HashMap<String, HashMap<String, SecretString>>,
}

impl Secrets {
    pub fn new(sections: HashMap<String, HashMap<String, SecretString>>) -> Self {
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&HashMap<String, SecretString>> {
        self.sections.get(name)
    }

    /// Look up `section.key`.
    pub fn get(&self, path: &str) -> Option<&SecretString> {
        let (section, key) = path.split_once('.')?;
        self.sections.get(section)?.get(key)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.sections.keys().collect();
        names.sort();
        f.debug_struct("Secrets").field("sections", &names).finish()
    }
}

/// Directory answering group membership questions (LDAP or similar).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Whether `user_name` belongs to any of `groups`.
    async fn is_allowed(&self, user_name: &str, groups: &[String]) -> anyhow::Result<bool>;
}

/// External clients keyed by name.
#[derive(Default, Clone)]
pub struct Clients {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
    groups: Option<Arc<dyn GroupDirectory>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: &str, client: Arc<T>) {
        self.entries.insert(name.to_string(), client);
    }

    pub fn with_group_directory(mut self, directory: Arc<dyn GroupDirectory>) -> Self {
        self.entries
            .insert(GROUP_DIRECTORY_CLIENT.to_string(), Arc::new(()) as Arc<dyn Any + Send + Sync>);
        self.groups = Some(directory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name)?.clone().downcast::<T>().ok()
    }

    pub fn group_directory(&self) -> Option<&Arc<dyn GroupDirectory>> {
        self.groups.as_ref()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients").field("names", &self.names()).finish()
    }
}

/// Everything the core needs from the running bot.
#[derive(Debug)]
pub struct BotContext {
    pub name: String,
    pub config: Value,
    pub secrets: Secrets,
    pub clients: Clients,
    pub shutdown: Shutdown,
    pub stats: StatsStore,
    pub started_at: DateTime<Utc>,
}

impl BotContext {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
            secrets: Secrets::default(),
            clients: Clients::default(),
            shutdown: Shutdown::new(),
            stats: StatsStore::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Configuration value at a dotted path.
    pub fn config_value(&self, path: &str) -> Result<&Value, LookupError> {
        extract(&self.config, path)
    }

    /// Configuration section for a handler; the whole tree when `section` is `None`.
    ///
    /// Missing sections yield an empty mapping.
    pub fn config_section(&self, section: Option<&str>) -> Value {
        match section {
            Some(path) => extract(&self.config, path)
                .cloned()
                .unwrap_or_else(|_| Value::Object(Default::default())),
            None => self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_extract_paths() {
        let root = json!({"jenkins": {"url": "http://ci", "watch": {"max": 3}}});
        assert_eq!(extract(&root, "jenkins.url").unwrap(), "http://ci");
        assert_eq!(extract(&root, "jenkins.watch.max").unwrap(), 3);
        assert_eq!(
            extract(&root, "jenkins.nope"),
            Err(LookupError::Missing("nope".into()))
        );
        assert_eq!(
            extract(&root, "jenkins.url.x"),
            Err(LookupError::NotAMapping("x".into()))
        );
        assert_eq!(extract(&root, ""), Err(LookupError::EmptyPath));
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("Yes")));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!("off")));
        assert!(!truthy(&json!(null)));
    }

    #[test]
    fn test_secrets_lookup() {
        let mut section = HashMap::new();
        section.insert("token".to_string(), SecretString::new("s3cr3t".into()));
        let mut sections = HashMap::new();
        sections.insert("jira".to_string(), section);
        let secrets = Secrets::new(sections);

        assert_eq!(secrets.get("jira.token").unwrap().expose_secret(), "s3cr3t");
        assert!(secrets.get("jira.password").is_none());
        assert!(!format!("{:?}", secrets).contains("s3cr3t"));
    }

    #[test]
    fn test_clients_typed_lookup() {
        struct Jenkins {
            url: String,
        }
        let mut clients = Clients::new();
        clients.insert("jenkins", Arc::new(Jenkins { url: "http://ci".into() }));

        assert!(clients.contains("jenkins"));
        assert_eq!(clients.get::<Jenkins>("jenkins").unwrap().url, "http://ci");
        assert!(clients.get::<String>("jenkins").is_none());
        assert!(clients.get::<Jenkins>("jira").is_none());
    }

    #[test]
    fn test_config_section_tolerant() {
        let bot = BotContext::new("bot", json!({"hello": {"greeting": "hi"}}));
        assert_eq!(bot.config_section(Some("hello")), json!({"greeting": "hi"}));
        assert_eq!(bot.config_section(Some("missing")), json!({}));
        assert_eq!(bot.config_section(None), bot.config);
    }
}
