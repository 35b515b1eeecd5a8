// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::control::{TargetCfg, TargetCfgDb};
use std::fmt::{Display, Formatter};

fn row(f: &mut Formatter<'_>, name: &str, target: &str, level: &str, tags: &str) -> std::fmt::Result {
    writeln!(f, " {name:<20} {target:<36} {level:<6} {tags}")
}

impl Display for TargetCfg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        row(
            f,
            self.name,
            self.target,
            &self.level.to_string(),
            &self.tags.join(","),
        )
    }
}

/// The target table, sorted by name, with the default level last.
impl Display for TargetCfgDb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "tracing targets:")?;
        row(f, "NAME", "TARGET", "LEVEL", "TAGS")?;
        let mut targets: Vec<&TargetCfg> = self.targets.values().collect();
        targets.sort_by_key(|t| (t.name, t.target));
        for target in targets {
            write!(f, "{target}")?;
        }
        row(f, "(default)", "*", &self.level.to_string(), "")
    }
}
