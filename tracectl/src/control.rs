// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::targets::{TARGET_DECLS, TargetDecl};
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Errors which may occur when (re)configuring tracing.
#[derive(Debug, thiserror::Error)]
pub enum TraceCtlError {
    /// An item of a configuration string is not of the form `tag=level`.
    #[error("invalid syntax '{0}': it should be tag=loglevel")]
    Syntax(String),
    /// The level of a configuration item is not a known level.
    #[error("invalid level '{0}'")]
    Level(String),
    /// A directive could not be turned into a filter.
    #[error("invalid filter directive '{0}'")]
    Directive(String),
    /// The filter could not be swapped in the subscriber.
    #[error("failed to reload tracing filter: {0}")]
    Reload(String),
}

/// Configuration of a single tracing target.
#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: Vec<&'static str>,
    pub(crate) custom: bool,
}

impl From<&TargetDecl> for TargetCfg {
    fn from(decl: &TargetDecl) -> Self {
        let mut tags = decl.tags.to_vec();
        if !tags.contains(&decl.name) {
            tags.push(decl.name);
        }
        Self {
            target: decl.target,
            name: decl.name,
            level: decl.level,
            tags,
            custom: decl.custom,
        }
    }
}

impl TargetCfg {
    /// The target (module path, or custom target string).
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// The current level of the target.
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Returns true if the target was declared with `custom_target!`.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.custom
    }
}

/// A tag and the targets it selects.
#[derive(Debug, Clone)]
pub struct Tag {
    pub(crate) tag: &'static str,
    pub(crate) targets: HashSet<&'static str>,
}

impl Tag {
    fn new(tag: &'static str) -> Self {
        Self {
            tag,
            targets: HashSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.tag
    }

    /// The targets selected by this tag.
    pub fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.targets.iter().copied()
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) level: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetCfg>,
    pub(crate) tags: OrderMap<&'static str, Tag>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for decl in TARGET_DECLS {
            db.register(decl);
        }
        db
    }

    fn register(&mut self, decl: &TargetDecl) {
        let cfg = TargetCfg::from(decl);
        for &tag in &cfg.tags {
            self.tags
                .entry(tag)
                .or_insert_with(|| Tag::new(tag))
                .targets
                .insert(decl.target);
        }
        if self.targets.insert(decl.target, cfg).is_some() {
            warn!("tracing target {} is declared more than once", decl.target);
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, TraceCtlError> {
        let mut filter = EnvFilter::new(self.level.to_string());
        for target in self.targets.values() {
            let directive = format!("{}={}", target.target, target.level);
            let parsed = directive
                .parse()
                .map_err(|_| TraceCtlError::Directive(directive.clone()))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    /// A config string which reproduces the current configuration.
    pub(crate) fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.level);
        for target in self.targets.values() {
            out += format!(",{}={}", target.name, target.level).as_str();
        }
        out
    }

    pub(crate) fn tag_targets_mut(&mut self, tag: &str) -> Vec<&mut TargetCfg> {
        match self.tags.get(tag) {
            Some(tag) => self
                .targets
                .values_mut()
                .filter(|target| tag.targets.contains(target.target))
                .collect(),
            None => vec![],
        }
    }
}

/// Runtime control over the level of every declared tracing target.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetCfgDb::new(LevelFilter::INFO);
        let initial = db
            .env_filter()
            .unwrap_or_else(|_| EnvFilter::new(LevelFilter::INFO.to_string()));
        let (filter, reload_filter) = reload::Layer::new(initial);

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_level(true);

        // a subscriber may already be installed (e.g. by a test harness); keep it
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            warn!("tracing subscriber already installed: {e}");
        }

        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }

    fn reload(&self, db: &TargetCfgDb) -> Result<(), TraceCtlError> {
        self.reload_filter
            .reload(db.env_filter()?)
            .map_err(|e| TraceCtlError::Reload(e.to_string()))
    }

    /// Install the subscriber if it is not installed yet.
    pub fn init() {
        get_trace_ctl();
    }

    /// Set the level of every target carrying `tag`.
    ///
    /// # Errors
    ///
    /// Fails if the new filter can not be installed.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.db.lock();
        let mut changed = 0;
        for target in db.tag_targets_mut(tag) {
            if target.level != level {
                target.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(&db)?;
        }
        info!("Changed log level for tag '{tag}' to {level}. Targets changed: {changed}");
        Ok(())
    }

    /// Set the level of every known target.
    ///
    /// # Errors
    ///
    /// Fails if the new filter can not be installed.
    pub fn set_level_all(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.db.lock();
        for target in db.targets.values_mut() {
            target.level = level;
        }
        self.reload(&db)
    }

    /// Set the level applied to targets nobody declared.
    ///
    /// # Errors
    ///
    /// Fails if the new filter can not be installed.
    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.db.lock();
        if db.level != level {
            db.level = level;
            info!("Set default log level to {level}");
            self.reload(&db)?;
        }
        Ok(())
    }

    /// The level applied to targets nobody declared.
    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.db.lock().level
    }

    /// Parse a string made of comma-separated `tag=level` items.
    fn parse_tracing_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
        let mut result = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some((tag, level)) = item.split_once('=') else {
                return Err(TraceCtlError::Syntax(item.to_string()));
            };
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::Level(level.trim().to_string()))?;
            result.insert(tag.trim().to_string(), level);
        }
        Ok(result)
    }

    /// Apply a configuration such as `default=error,all=info,sf=debug`.
    ///
    /// `default` sets the default level, `all` sets every known target, and any other key is
    /// treated as a tag.
    ///
    /// # Errors
    ///
    /// Fails on malformed input or if the new filter can not be installed.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse_tracing_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level)?;
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level)?;
        }
        // tags come last so `all=info,sf=debug` leaves sf at debug
        for (tag, level) in config
            .iter()
            .filter(|(tag, _)| !matches!(tag.as_str(), "default" | "all"))
        {
            self.set_tag_level(tag, *level)?;
        }
        Ok(())
    }

    /// Look up the configuration of a target.
    #[must_use]
    pub fn get_target(&self, target: &str) -> Option<TargetCfg> {
        self.db.lock().targets.get(target).cloned()
    }

    /// Look up a tag.
    #[must_use]
    pub fn get_tag(&self, tag: &str) -> Option<Tag> {
        self.db.lock().tags.get(tag).cloned()
    }

    /// Log the target table.
    pub fn dump(&self) {
        let db = self.db.lock();
        info!("{db}");
    }

    /// A config string which reproduces the current configuration.
    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.db.lock().as_config_string()
    }
}

/// Get a reference to the process [`TracingControl`], initializing it if needed.
pub fn get_trace_ctl() -> &'static TracingControl {
    static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();
    TRACING_CTL.get_or_init(TracingControl::new)
}
