//! Ranking of report records by a field chosen at runtime
//!
//! Each record type publishes a static table of named accessors. Sorting
//! looks a name up in that table, picks one comparator for the field's
//! declared kind, and runs a stable sort with it.

use crate::error::{Error, Result};
use crate::models::{ContainerMetricsSummary, ContainerResourceRow};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Semantic type of a rankable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Resource amount compared by base-unit magnitude; absent sorts first
    Quantity,
    /// Percentages and counts
    Integer,
    /// Names, compared lexicographically
    Text,
}

/// A field value pulled out of a record for comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Quantity(Option<i64>),
    Integer(i64),
    Text(Cow<'a, str>),
}

impl<'a> FieldValue<'a> {
    fn text(value: &'a str) -> Self {
        FieldValue::Text(Cow::Borrowed(value))
    }
}

/// Named accessor into a record of type `R`
pub struct Field<R> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub extract: fn(&R) -> FieldValue<'_>,
}

/// A record type whose fields can be ranked by name
pub trait Rankable: Sized + 'static {
    const FIELDS: &'static [Field<Self>];
}

/// Names accepted by [`rank`] for `R`, in display order
pub fn field_names<R: Rankable>() -> Vec<&'static str> {
    R::FIELDS.iter().map(|f| f.name).collect()
}

/// Resolve a field name, or report the valid names
pub fn lookup_field<R: Rankable>(name: &str) -> Result<&'static Field<R>> {
    R::FIELDS
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| Error::UnknownField {
            field: name.to_string(),
            valid: field_names::<R>(),
        })
}

/// Check a field name without sorting anything
pub fn validate_field<R: Rankable>(name: &str) -> Result<()> {
    lookup_field::<R>(name).map(|_| ())
}

/// Stable-sort `records` by the named field.
///
/// Ascending by default; `reverse` flips the comparison so records with
/// equal keys keep their input order in both directions.
pub fn rank<R: Rankable>(records: &mut [R], field: &str, reverse: bool) -> Result<()> {
    let field = lookup_field::<R>(field)?;
    let compare = comparator(field.kind);

    records.sort_by(|a, b| {
        let ord = compare(&(field.extract)(a), &(field.extract)(b));
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });

    Ok(())
}

type Comparator = fn(&FieldValue<'_>, &FieldValue<'_>) -> Ordering;

fn comparator(kind: FieldKind) -> Comparator {
    match kind {
        FieldKind::Quantity => compare_quantity,
        FieldKind::Integer => compare_integer,
        FieldKind::Text => compare_text,
    }
}

fn compare_quantity(a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Quantity(x), FieldValue::Quantity(y)) => x.cmp(y),
        _ => kind_mismatch(FieldKind::Quantity, a, b),
    }
}

fn compare_integer(a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(y),
        _ => kind_mismatch(FieldKind::Integer, a, b),
    }
}

fn compare_text(a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        _ => kind_mismatch(FieldKind::Text, a, b),
    }
}

// Accessor tables are static, so a mismatch is a bug in one of them.
fn kind_mismatch(kind: FieldKind, a: &FieldValue<'_>, b: &FieldValue<'_>) -> Ordering {
    panic!("field declared as {kind:?} produced {a:?} and {b:?}")
}

impl Rankable for ContainerResourceRow {
    const FIELDS: &'static [Field<Self>] = &[
        Field {
            name: "Namespace",
            kind: FieldKind::Text,
            extract: |r| FieldValue::text(&r.namespace),
        },
        Field {
            name: "Name",
            kind: FieldKind::Text,
            extract: |r| FieldValue::Text(Cow::Owned(r.name())),
        },
        Field {
            name: "NodeName",
            kind: FieldKind::Text,
            extract: |r| FieldValue::text(&r.node_name),
        },
        Field {
            name: "CpuReq",
            kind: FieldKind::Quantity,
            extract: |r| FieldValue::Quantity(Some(r.cpu_req.millis())),
        },
        Field {
            name: "PercentCpuReq",
            kind: FieldKind::Integer,
            extract: |r| FieldValue::Integer(r.percent_cpu_req),
        },
        Field {
            name: "CpuLimit",
            kind: FieldKind::Quantity,
            extract: |r| FieldValue::Quantity(Some(r.cpu_limit.millis())),
        },
        Field {
            name: "PercentCpuLimit",
            kind: FieldKind::Integer,
            extract: |r| FieldValue::Integer(r.percent_cpu_limit),
        },
        Field {
            name: "MemReq",
            kind: FieldKind::Quantity,
            extract: |r| FieldValue::Quantity(Some(r.mem_req.bytes())),
        },
        Field {
            name: "PercentMemoryReq",
            kind: FieldKind::Integer,
            extract: |r| FieldValue::Integer(r.percent_memory_req),
        },
        Field {
            name: "MemLimit",
            kind: FieldKind::Quantity,
            extract: |r| FieldValue::Quantity(Some(r.mem_limit.bytes())),
        },
        Field {
            name: "PercentMemoryLimit",
            kind: FieldKind::Integer,
            extract: |r| FieldValue::Integer(r.percent_memory_limit),
        },
    ];
}

impl Rankable for ContainerMetricsSummary {
    const FIELDS: &'static [Field<Self>] = &[
        Field {
            name: "Namespace",
            kind: FieldKind::Text,
            extract: |s| FieldValue::text(&s.namespace),
        },
        Field {
            name: "Name",
            kind: FieldKind::Text,
            extract: |s| FieldValue::Text(Cow::Owned(s.name())),
        },
        Field {
            name: "PodName",
            kind: FieldKind::Text,
            extract: |s| FieldValue::text(&s.pod_name),
        },
        Field {
            name: "ContainerName",
            kind: FieldKind::Text,
            extract: |s| FieldValue::text(&s.container_name),
        },
        Field {
            name: "NodeName",
            kind: FieldKind::Text,
            extract: |s| FieldValue::text(&s.node_name),
        },
        Field {
            name: "Last",
            kind: FieldKind::Quantity,
            extract: |s| FieldValue::Quantity(s.stats.map(|st| st.last)),
        },
        Field {
            name: "Min",
            kind: FieldKind::Quantity,
            extract: |s| FieldValue::Quantity(s.stats.map(|st| st.min)),
        },
        Field {
            name: "Max",
            kind: FieldKind::Quantity,
            extract: |s| FieldValue::Quantity(s.stats.map(|st| st.max)),
        },
        // Avg and Mode both read the kind-specific central value
        Field {
            name: "Avg",
            kind: FieldKind::Quantity,
            extract: |s| FieldValue::Quantity(s.stats.map(|st| st.central)),
        },
        Field {
            name: "Mode",
            kind: FieldKind::Quantity,
            extract: |s| FieldValue::Quantity(s.stats.map(|st| st.central)),
        },
        Field {
            name: "DataPoints",
            kind: FieldKind::Integer,
            extract: |s| FieldValue::Integer(i64::try_from(s.data_points()).unwrap_or(i64::MAX)),
        },
    ];
}
