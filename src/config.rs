use anyhow::{bail, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where assets with a given file extension are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainAssignment {
    /// A fixed subdomain label, e.g. `media` for `media.example.com`.
    Fixed(String),
    /// No fixed label; the extension is routed to a numbered bucket.
    RoundRobin,
}

/// Extension routing table plus the round-robin bucket count.
///
/// Shared, read-mostly state: one config can back any number of
/// [`RewriteSession`](crate::RewriteSession)s. Extension keys are stored
/// percent-decoded and lowercased, and lookups normalize the same way, so
/// `JPG`, `jpg`, and `%4Apg` all hit the same entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    #[serde(default = "default_max_static_domains")]
    max_static_domains: u32,
    #[serde(default = "default_extension_domains")]
    extensions: HashMap<String, DomainAssignment>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_static_domains: default_max_static_domains(),
            extensions: default_extension_domains(),
        }
    }
}

impl RewriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty routing table: nothing matches until extensions are added.
    pub fn empty() -> Self {
        Self {
            max_static_domains: default_max_static_domains(),
            extensions: HashMap::new(),
        }
    }

    pub fn max_static_domains(&self) -> u32 {
        self.max_static_domains
    }

    /// Set the number of round-robin buckets. Zero buckets would make the
    /// cursor wrap degenerate, so it is rejected.
    pub fn set_max_static_domains(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            bail!("max_static_domains must be at least 1");
        }
        self.max_static_domains = count;
        Ok(())
    }

    pub fn extensions(&self) -> &HashMap<String, DomainAssignment> {
        &self.extensions
    }

    pub fn add_extension(&mut self, extension: &str, assignment: DomainAssignment) {
        self.extensions
            .insert(normalize_extension(extension), assignment);
    }

    pub fn add_extensions<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (S, DomainAssignment)>,
        S: AsRef<str>,
    {
        for (extension, assignment) in entries {
            self.add_extension(extension.as_ref(), assignment);
        }
    }

    pub fn remove_extension(&mut self, extension: &str) {
        self.extensions.remove(&normalize_extension(extension));
    }

    pub fn remove_extensions<'a, I>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for extension in extensions {
            self.remove_extension(extension);
        }
    }

    /// Replace the whole routing table, normalizing every key.
    pub fn replace_extensions(&mut self, entries: HashMap<String, DomainAssignment>) {
        self.extensions = entries
            .into_iter()
            .map(|(extension, assignment)| (normalize_extension(&extension), assignment))
            .collect();
    }

    pub fn assignment_for(&self, extension: &str) -> Option<&DomainAssignment> {
        self.extensions.get(&normalize_extension(extension))
    }
}

/// Percent-decode, then lowercase. Applied to keys on insert and lookup.
pub(crate) fn normalize_extension(extension: &str) -> String {
    percent_decode_str(extension)
        .decode_utf8_lossy()
        .to_lowercase()
}

fn default_max_static_domains() -> u32 {
    4
}

fn default_extension_domains() -> HashMap<String, DomainAssignment> {
    let mut extensions = HashMap::new();

    for media in ["jpg", "gif", "png", "ico", "flv", "swf"] {
        extensions.insert(
            media.to_string(),
            DomainAssignment::Fixed("media".to_string()),
        );
    }
    extensions.insert("css".to_string(), DomainAssignment::Fixed("css".to_string()));
    extensions.insert("js".to_string(), DomainAssignment::Fixed("js".to_string()));

    extensions
}
