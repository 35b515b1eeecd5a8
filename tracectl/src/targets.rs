// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time collection of tracing target declarations.

use crate::LevelFilter;
use linkme::distributed_slice;

/// A target as declared by [`trace_target!`](crate::trace_target) or
/// [`custom_target!`](crate::custom_target).
#[derive(Debug)]
pub struct TargetDecl {
    /// What `tracing` filters on: a module path, or an arbitrary string for custom targets.
    pub(crate) target: &'static str,
    /// Short name; always usable as a tag.
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
    pub(crate) custom: bool,
}

impl TargetDecl {
    #[must_use]
    pub const fn module(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
            custom: false,
        }
    }

    #[must_use]
    pub const fn custom(
        target: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name: target,
            level,
            tags,
            custom: true,
        }
    }
}

/// Every target declared by the crates linked into the binary.
#[distributed_slice]
pub static TARGET_DECLS: [TargetDecl];

/// Declare the tracing target of the calling module under `$name`, with a default level and
/// tags.  Invoke once per module; the calling crate needs `linkme` as a dependency.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::LevelFilter;
            use $crate::targets::{TARGET_DECLS, TargetDecl};

            #[linkme::distributed_slice(TARGET_DECLS)]
            static DECL: TargetDecl = TargetDecl::module(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declare a target which is not a module path of ours, e.g. another crate's.
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::LevelFilter;
            use $crate::targets::{TARGET_DECLS, TargetDecl};

            #[linkme::distributed_slice(TARGET_DECLS)]
            static DECL: TargetDecl = TargetDecl::custom($target, $level, $tags);
        };
    };
}
