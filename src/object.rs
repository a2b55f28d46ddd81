//! Object configuration and runtime state
//!
//! An object's configuration is a TOML document. The `DEFAULT` table holds
//! object keywords; every table named like a RID declares a resource, in
//! document order.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

use crate::path::ObjectPath;
use crate::paths::Paths;
use crate::resource::{CommandResource, Keywords};
use crm::{ActionContext, Availability, Resource, Rid};

pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Action lock file, in the object var dir
pub const LOCK_FILE: &str = "action.lock";

/// `section.key` reference; a bare key is in `DEFAULT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRef {
    pub section: String,
    pub key: String,
}

impl KeywordRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (section, key) = match s.rsplit_once('.') {
            Some((section, key)) => (section, key),
            None => (DEFAULT_SECTION, s),
        };
        if section.is_empty() || key.is_empty() {
            bail!("invalid keyword '{s}': expected [<section>.]<key>");
        }
        Ok(Self {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Parse `[<section>.]<key>=<value>`
    pub fn parse_assignment(s: &str) -> Result<(Self, String)> {
        let (lhs, value) = s
            .split_once('=')
            .with_context(|| format!("invalid assignment '{s}': expected <keyword>=<value>"))?;
        Ok((Self::parse(lhs)?, value.to_string()))
    }
}

impl std::fmt::Display for KeywordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section, self.key)
    }
}

/// Parsed object configuration document
#[derive(Debug, Clone, Default)]
pub struct ObjectConfig {
    table: Table,
}

impl ObjectConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let table: Table = toml::from_str(content).context("Invalid object configuration")?;
        for (name, value) in &table {
            if !value.is_table() {
                bail!("top-level key '{name}' must be a section");
            }
        }
        Ok(Self { table })
    }

    pub fn load(file: &Path) -> Result<Self> {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Could not read {}", file.display()))?;
        Self::parse(&content).with_context(|| format!("In {}", file.display()))
    }

    /// Write atomically next to the target
    pub fn save(&self, file: &Path) -> Result<()> {
        let dir = file
            .parent()
            .with_context(|| format!("No parent directory for {}", file.display()))?;
        fs::create_dir_all(dir)?;
        let content = toml::to_string(&self.table).context("Could not serialize configuration")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.persist(file)
            .with_context(|| format!("Could not write {}", file.display()))?;
        Ok(())
    }

    pub fn get(&self, kw: &KeywordRef) -> Option<String> {
        self.table
            .get(&kw.section)?
            .as_table()?
            .get(&kw.key)
            .map(value_to_string)
    }

    pub fn set(&mut self, kw: &KeywordRef, value: &str) -> Result<()> {
        let section = self
            .table
            .entry(kw.section.clone())
            .or_insert_with(|| Value::Table(Table::new()));
        let Some(section) = section.as_table_mut() else {
            bail!("'{}' is not a section", kw.section);
        };
        section.insert(kw.key.clone(), Value::String(value.to_string()));
        Ok(())
    }

    /// Remove a keyword, returning whether it was set
    pub fn unset(&mut self, kw: &KeywordRef) -> bool {
        self.table
            .get_mut(&kw.section)
            .and_then(Value::as_table_mut)
            .is_some_and(|section| section.remove(&kw.key).is_some())
    }

    /// Resource sections in declaration order
    pub fn resource_sections(&self) -> Vec<(String, Keywords)> {
        self.table
            .iter()
            .filter(|(name, _)| Rid::is_rid(name))
            .filter_map(|(name, value)| {
                let keywords = value
                    .as_table()?
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect();
                Some((name.clone(), keywords))
            })
            .collect()
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Availability of one resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub rid: String,
    pub description: String,
    pub status: Availability,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated status of an object on this node
#[derive(Debug, Clone, Serialize)]
pub struct ObjectStatus {
    pub path: ObjectPath,
    pub avail: Availability,
    pub frozen: bool,
    pub resources: Vec<ResourceStatus>,
}

/// An object configured on this node
#[derive(Debug, Clone)]
pub struct Object {
    path: ObjectPath,
    config_file: PathBuf,
    var_dir: PathBuf,
    config: ObjectConfig,
}

impl Object {
    pub fn open(paths: &Paths, path: &ObjectPath) -> Result<Self> {
        let config_file = paths.object_config(path);
        if !config_file.is_file() {
            bail!("object {path} does not exist on this node");
        }
        Ok(Self {
            path: path.clone(),
            config: ObjectConfig::load(&config_file)?,
            var_dir: paths.object_var(path),
            config_file,
        })
    }

    /// Create the configuration, empty or copied from a template file
    pub fn create(paths: &Paths, path: &ObjectPath, from: Option<&Path>) -> Result<Self> {
        let config_file = paths.object_config(path);
        if config_file.exists() {
            bail!("object {path} already exists");
        }
        let config = match from {
            Some(template) => ObjectConfig::load(template)?,
            None => ObjectConfig::default(),
        };
        config.save(&config_file)?;
        log::info!("{path}: created {}", config_file.display());
        Ok(Self {
            path: path.clone(),
            config,
            var_dir: paths.object_var(path),
            config_file,
        })
    }

    /// Remove the configuration and runtime state
    pub fn delete(&self) -> Result<()> {
        fs::remove_file(&self.config_file)
            .with_context(|| format!("Could not remove {}", self.config_file.display()))?;
        if self.var_dir.exists() {
            // the caller still holds the action lock
            for entry in fs::read_dir(&self.var_dir)? {
                let entry = entry?;
                if entry.file_name() != LOCK_FILE {
                    let p = entry.path();
                    if p.is_dir() {
                        fs::remove_dir_all(&p)?;
                    } else {
                        fs::remove_file(&p)?;
                    }
                }
            }
        }
        log::info!("{}: deleted", self.path);
        Ok(())
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn var_dir(&self) -> &Path {
        &self.var_dir
    }

    pub fn log_file(&self) -> PathBuf {
        self.var_dir.join("object.log")
    }

    fn frozen_flag(&self) -> PathBuf {
        self.var_dir.join("frozen")
    }

    /// Resource drivers in declaration order, failing on a malformed section
    pub fn resources(&self) -> Result<Vec<CommandResource>> {
        self.config
            .resource_sections()
            .into_iter()
            .map(|(rid, keywords)| CommandResource::new(rid, keywords))
            .collect()
    }

    /// Environment handed to resource commands
    pub fn env(&self, nodename: &str) -> Vec<(String, String)> {
        vec![
            ("OM_PATH".to_string(), self.path.to_string()),
            ("OM_NAME".to_string(), self.path.name().to_string()),
            ("OM_NAMESPACE".to_string(), self.path.namespace().to_string()),
            ("OM_KIND".to_string(), self.path.kind().to_string()),
            ("OM_NODENAME".to_string(), nodename.to_string()),
        ]
    }

    // =========================================================================
    // Keywords
    // =========================================================================

    pub fn get(&self, kw: &KeywordRef) -> Option<String> {
        self.config.get(kw)
    }

    /// Keyword value with references substituted
    pub fn eval(&self, kw: &KeywordRef, nodename: &str) -> Option<String> {
        let raw = self.config.get(kw)?;
        Some(
            raw.replace("{name}", self.path.name())
                .replace("{namespace}", self.path.namespace())
                .replace("{kind}", self.path.kind().as_str())
                .replace("{path}", &self.path.to_string())
                .replace("{nodename}", nodename),
        )
    }

    pub fn set(&mut self, assignments: &[(KeywordRef, String)]) -> Result<()> {
        for (kw, value) in assignments {
            self.config.set(kw, value)?;
        }
        self.config.save(&self.config_file)
    }

    /// Remove keywords, returning how many were set
    pub fn unset(&mut self, keywords: &[KeywordRef]) -> Result<usize> {
        let removed = keywords.iter().filter(|kw| self.config.unset(kw)).count();
        if removed > 0 {
            self.config.save(&self.config_file)?;
        }
        Ok(removed)
    }

    // =========================================================================
    // Freeze
    // =========================================================================

    pub fn is_frozen(&self) -> bool {
        self.frozen_flag().exists()
    }

    pub fn freeze(&self) -> Result<()> {
        write_flag(&self.frozen_flag())
    }

    pub fn unfreeze(&self) -> Result<()> {
        remove_flag(&self.frozen_flag())
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn status(&self, ctx: &ActionContext) -> Result<ObjectStatus> {
        let resources: Vec<ResourceStatus> = self
            .resources()?
            .iter()
            .map(|r| {
                let disabled = r.is_disabled();
                let (status, error) = if disabled {
                    (Availability::NotApplicable, None)
                } else {
                    match r.status(ctx) {
                        Ok(status) => (status, None),
                        Err(e) => {
                            log::warn!("{}: {}: status: {e:#}", self.path, r.rid());
                            (Availability::Undef, Some(format!("{e:#}")))
                        }
                    }
                };
                ResourceStatus {
                    rid: r.rid().to_string(),
                    description: r.description(),
                    status,
                    disabled,
                    error,
                }
            })
            .collect();

        Ok(ObjectStatus {
            path: self.path.clone(),
            avail: Availability::aggregate(resources.iter().map(|r| r.status)),
            frozen: self.is_frozen(),
            resources,
        })
    }
}

/// Create a flag file (and its parents)
pub fn write_flag(flag: &Path) -> Result<()> {
    if let Some(dir) = flag.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(flag, chrono::Utc::now().to_rfc3339())
        .with_context(|| format!("Could not write {}", flag.display()))
}

/// Remove a flag file; a missing flag is fine
pub fn remove_flag(flag: &Path) -> Result<()> {
    match fs::remove_file(flag) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Could not remove {}", flag.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[DEFAULT]
nodes = "n1 n2"
env = "{namespace}-{name}@{nodename}"

["app#1"]
seq = 1
start = "true"
status = "exit 0"

["ip#1"]
seq = 2
tags = ["net", "public"]
status = "exit 1"

["fs#1"]
disable = true
"#;

    fn setup() -> (TempDir, Paths, ObjectPath) {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path().join("etc"), dir.path().join("var"));
        let path = ObjectPath::parse("ns1/svc/web").unwrap();
        let file = paths.object_config(&path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, CONFIG).unwrap();
        (dir, paths, path)
    }

    #[test]
    fn test_keyword_ref() {
        assert_eq!(
            KeywordRef::parse("nodes").unwrap(),
            KeywordRef {
                section: "DEFAULT".into(),
                key: "nodes".into()
            }
        );
        let kw = KeywordRef::parse("app.web.start").unwrap();
        assert_eq!(kw.section, "app.web");
        assert_eq!(kw.key, "start");
        assert!(KeywordRef::parse(".x").is_err());
        let (kw, value) = KeywordRef::parse_assignment("app#1.start=echo a=b").unwrap();
        assert_eq!(kw.section, "app#1");
        assert_eq!(value, "echo a=b");
    }

    #[test]
    fn test_resources_in_declaration_order() {
        let (_dir, paths, path) = setup();
        let obj = Object::open(&paths, &path).unwrap();
        let rids: Vec<String> = obj.resources().unwrap().iter().map(|r| r.rid().to_string()).collect();
        assert_eq!(rids, ["app#1", "ip#1", "fs#1"]);
        assert_eq!(obj.resources().unwrap()[1].tags(), ["net", "public"]);
        assert!(obj.resources().unwrap()[2].is_disabled());
    }

    #[test]
    fn test_get_eval_set_unset() {
        let (_dir, paths, path) = setup();
        let mut obj = Object::open(&paths, &path).unwrap();
        let env = KeywordRef::parse("env").unwrap();
        assert_eq!(obj.eval(&env, "n1").as_deref(), Some("ns1-web@n1"));

        let seq = KeywordRef::parse("app#1.seq").unwrap();
        assert_eq!(obj.get(&seq).as_deref(), Some("1"));

        obj.set(&[(KeywordRef::parse("app#1.stop").unwrap(), "echo stop".into())])
            .unwrap();
        let reopened = Object::open(&paths, &path).unwrap();
        assert_eq!(
            reopened.get(&KeywordRef::parse("app#1.stop").unwrap()).as_deref(),
            Some("echo stop")
        );
        // order survives a save
        let rids: Vec<String> = reopened
            .resources()
            .unwrap()
            .iter()
            .map(|r| r.rid().to_string())
            .collect();
        assert_eq!(rids, ["app#1", "ip#1", "fs#1"]);

        assert_eq!(obj.unset(&[seq.clone(), KeywordRef::parse("nope").unwrap()]).unwrap(), 1);
        assert_eq!(obj.get(&seq), None);
    }

    #[test]
    fn test_malformed_seq_fails_status() {
        let (_dir, paths, path) = setup();
        let mut obj = Object::open(&paths, &path).unwrap();
        obj.set(&[(KeywordRef::parse("ip#1.seq").unwrap(), "later".into())])
            .unwrap();
        let reopened = Object::open(&paths, &path).unwrap();
        let err = reopened.status(&ActionContext::default()).unwrap_err();
        assert!(err.to_string().contains("seq is set to 'later'"), "{err}");
    }

    #[test]
    fn test_status_and_freeze() {
        let (_dir, paths, path) = setup();
        let obj = Object::open(&paths, &path).unwrap();
        let status = obj.status(&ActionContext::default()).unwrap();
        assert_eq!(status.resources[0].status, Availability::Up);
        assert_eq!(status.resources[1].status, Availability::Down);
        assert_eq!(status.resources[2].status, Availability::NotApplicable);
        assert_eq!(status.avail, Availability::Warn);
        assert!(!status.frozen);

        obj.freeze().unwrap();
        assert!(obj.is_frozen());
        obj.unfreeze().unwrap();
        obj.unfreeze().unwrap();
        assert!(!obj.is_frozen());
    }

    #[test]
    fn test_create_and_delete() {
        let (_dir, paths, _) = setup();
        let path = ObjectPath::parse("cfg/app").unwrap();
        let obj = Object::create(&paths, &path, None).unwrap();
        assert!(paths.object_config(&path).is_file());
        assert!(Object::create(&paths, &path, None).is_err());
        obj.freeze().unwrap();
        obj.delete().unwrap();
        assert!(!paths.object_config(&path).exists());
        assert!(Object::open(&paths, &path).is_err());
    }

    #[test]
    fn test_rejects_non_section_top_level() {
        assert!(ObjectConfig::parse("nodes = \"n1\"\n").is_err());
    }
}
