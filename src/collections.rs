//! Named, sorted groups of files published into the build context.
//!
//! Each collection definition selects files by pattern, sorts them by a
//! metadata key, and stores the resulting id list under
//! `collections.<name>`, where templates can enumerate it. Members also get
//! the collection name appended to their `collection` metadata list.
//!
//! ## Ordering
//!
//! Sorting is stable; files with equal keys keep their tree order.
//!
//! | Direction | Present values | Missing key |
//! |-----------|----------------|-------------|
//! | ascending | low → high | last |
//! | `reverse` | high → low | first |
//!
//! A missing key includes an explicit `null`. All present values of one
//! collection must be mutually comparable (see [`Value::compare`]); a
//! collection mixing dates and strings fails the build.

use crate::error::BuildError;
use crate::pattern::PatternSet;
use crate::pipeline::Context;
use crate::tree::{File, FileTree};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Metadata key listing the collections a file belongs to.
pub const MEMBERSHIP_KEY: &str = "collection";

#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pattern: PatternSet,
    sort_by: Option<String>,
    reverse: bool,
    limit: Option<usize>,
}

impl CollectionSpec {
    pub fn new(pattern: PatternSet) -> Self {
        Self {
            pattern,
            sort_by: None,
            reverse: false,
            limit: None,
        }
    }

    #[must_use]
    pub fn sort_by(mut self, key: impl Into<String>) -> Self {
        self.sort_by = Some(key.into());
        self
    }

    #[must_use]
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collections {
    definitions: BTreeMap<String, CollectionSpec>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn define(mut self, name: impl Into<String>, spec: CollectionSpec) -> Self {
        self.definitions.insert(name.into(), spec);
        self
    }

    pub fn run(&self, tree: &mut FileTree, ctx: &mut Context) -> Result<(), BuildError> {
        for (name, spec) in &self.definitions {
            let members = select(name, spec, tree)?;
            debug!(collection = %name, members = members.len(), "collected");

            for key in &members {
                if let Some(file) = tree.get_mut(key) {
                    add_membership(file, name);
                }
            }

            let ids = members
                .iter()
                .filter_map(|k| tree.get(k).map(|f| f.id().to_string()))
                .collect();
            ctx.set_collection(name.clone(), ids);
        }
        Ok(())
    }
}

/// Matching keys for one definition, sorted and limited.
fn select(name: &str, spec: &CollectionSpec, tree: &FileTree) -> Result<Vec<String>, BuildError> {
    let mut members: Vec<(&String, &File)> = tree
        .iter()
        .filter(|(k, _)| spec.pattern.is_match(k))
        .collect();

    if let Some(sort_key) = &spec.sort_by {
        let sort_values: Vec<Option<&Value>> = members
            .iter()
            .map(|(_, f)| f.metadata.get(sort_key).filter(|v| !v.is_null()))
            .collect();
        check_comparable(name, sort_key, &members, &sort_values)?;

        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by(|&a, &b| compare_keys(sort_values[a], sort_values[b], spec.reverse));
        members = order.into_iter().map(|i| members[i]).collect();
    }

    let mut keys: Vec<String> = members.into_iter().map(|(k, _)| k.clone()).collect();
    if let Some(limit) = spec.limit {
        keys.truncate(limit);
    }
    Ok(keys)
}

fn compare_keys(a: Option<&Value>, b: Option<&Value>, reverse: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.compare(y).unwrap_or(Ordering::Equal);
            if reverse { ord.reverse() } else { ord }
        }
        (Some(_), None) if reverse => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) if reverse => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn check_comparable(
    name: &str,
    sort_key: &str,
    members: &[(&String, &File)],
    values: &[Option<&Value>],
) -> Result<(), BuildError> {
    let mut present = members.iter().zip(values).filter_map(|((k, _), v)| v.map(|v| (k, v)));
    let Some((first_key, first)) = present.next() else {
        return Ok(());
    };
    for (key, value) in present {
        if first.compare(value).is_none() {
            return Err(BuildError::stage(
                "collections",
                format!(
                    "collection `{name}` cannot sort by `{sort_key}`: {first_key} has a {} but {key} has a {}",
                    first.type_name(),
                    value.type_name()
                ),
            ));
        }
    }
    Ok(())
}

fn add_membership(file: &mut File, name: &str) {
    let entry = file
        .metadata
        .entry(MEMBERSHIP_KEY.to_string())
        .or_insert_with(|| Value::List(Vec::new()));
    if let Value::String(single) = entry {
        let single = std::mem::take(single);
        *entry = Value::List(vec![Value::String(single)]);
    }
    match entry {
        Value::List(names) => {
            if !names.iter().any(|n| n.as_str() == Some(name)) {
                names.push(Value::from(name));
            }
        }
        other => *other = Value::List(vec![Value::from(name)]),
    }
}
