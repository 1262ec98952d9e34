//! Allow-lists for raw options forwarded to the apply tool.
//!
//! Raw options come from App resources (tenant controlled) and from the
//! controller config. Only flags whose name is in the allow-list of the
//! current operation are forwarded; values are never inspected.

use std::collections::BTreeSet;

use crate::error::{DeployError, DeployResult};

/// Operation kinds, each with its own allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Deploy,
    Delete,
    Inspect,
}

/// A parsed `--name[=value]` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub value: Option<String>,
}

impl Flag {
    pub fn parse(opt: &str) -> DeployResult<Self> {
        let rest = opt
            .strip_prefix("--")
            .ok_or_else(|| DeployError::MalformedFlag(opt.to_string()))?;
        let (name, value) = match rest.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (rest, None),
        };
        if name.is_empty() || name.starts_with('-') {
            return Err(DeployError::MalformedFlag(opt.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// Immutable set of permitted flag names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedFlagSet {
    names: BTreeSet<String>,
}

impl AllowedFlagSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn includes(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Validate every option, then append them all to `args`.
    ///
    /// The first rejected option fails the whole pass; `args` is left
    /// untouched in that case.
    pub fn append_raw_opts(&self, args: &mut Vec<String>, opts: &[String]) -> DeployResult<()> {
        for opt in opts {
            let flag = Flag::parse(opt)?;
            if !self.includes(&flag.name) {
                return Err(DeployError::DisallowedFlag(flag.name));
            }
        }
        args.extend(opts.iter().cloned());
        Ok(())
    }
}

const CHANGE_SET_FLAGS: &[&str] = &[
    "diff-changes",
    "diff-changes-yaml",
    "diff-context",
    "diff-summary",
    "diff-mask",
    "diff-run",
    "diff-exit-status",
    "diff-filter",
];

const APPLY_FLAGS: &[&str] = &[
    "apply-ignored",
    "apply-default-update-strategy",
    "apply-concurrency",
    "apply-exit-status",
    "apply-check-interval",
    "wait",
    "wait-ignored",
    "wait-timeout",
    "wait-concurrency",
    "wait-check-interval",
    "wait-resource-timeout",
    "exit-early-on-apply-error",
    "exit-early-on-wait-error",
];

const DEPLOY_ONLY_FLAGS: &[&str] = &[
    "into-ns",
    "map-ns",
    "logs",
    "logs-all",
    "app-changes-max-to-keep",
    "existing-non-labeled-resources-check",
    "existing-non-labeled-resources-check-concurrency",
    "overview-only",
    "default-label-scoping-rules",
    "dangerous-allow-empty-list-of-resources",
    "dangerous-override-ownership-of-existing-resources",
    "dangerous-ignore-failing-api-services",
];

const DELETE_ONLY_FLAGS: &[&str] = &["filter", "dangerous-ignore-failing-api-services"];

const INSPECT_FLAGS: &[&str] = &[
    "filter",
    "tree",
    "raw",
    "status",
    "dangerous-ignore-failing-api-services",
];

/// The allow-lists for all three operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedFlags {
    pub deploy: AllowedFlagSet,
    pub delete: AllowedFlagSet,
    pub inspect: AllowedFlagSet,
}

impl AllowedFlags {
    /// Flag sets accepted for `kapp`.
    pub fn kapp() -> Self {
        let deploy = CHANGE_SET_FLAGS
            .iter()
            .chain(APPLY_FLAGS)
            .chain(DEPLOY_ONLY_FLAGS)
            .copied();
        let delete = CHANGE_SET_FLAGS
            .iter()
            .chain(APPLY_FLAGS)
            .chain(DELETE_ONLY_FLAGS)
            .copied();

        Self {
            deploy: AllowedFlagSet::new(deploy),
            delete: AllowedFlagSet::new(delete),
            inspect: AllowedFlagSet::new(INSPECT_FLAGS.iter().copied()),
        }
    }

    pub fn for_operation(&self, op: Operation) -> &AllowedFlagSet {
        match op {
            Operation::Deploy => &self.deploy,
            Operation::Delete => &self.delete,
            Operation::Inspect => &self.inspect,
        }
    }
}

impl Default for AllowedFlags {
    fn default() -> Self {
        Self::kapp()
    }
}
