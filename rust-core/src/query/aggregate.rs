//! Aggregation engine: group-by, reduce, sort and truncate.
//!
//! Groups are discovered in first-seen row order; every later ordering is a
//! stable sort on top of that, so the output is fully determined by the
//! input view and the `AggregationSpec`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::error::{EngineError, EngineResult};
use crate::data::domain::{Column, ColumnKind, Schema, Table, Value};

use super::view::View;

/// Named reduction over the metric column of one group.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Sum,
    Min,
    Max,
    /// Number of rows in the group, missing metric values included.
    Count,
    /// Most frequent non-missing value; ties go to the first seen.
    Mode,
    /// First non-missing value.
    First,
    /// Number of distinct non-missing values.
    Distinct,
}

impl Reducer {
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            Reducer::Mean | Reducer::Sum | Reducer::Min | Reducer::Max
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Count => "count",
            Reducer::Mode => "mode",
            Reducer::First => "first",
            Reducer::Distinct => "distinct",
        }
    }

    fn output_kind(&self, input: ColumnKind) -> ColumnKind {
        match self {
            Reducer::Mode | Reducer::First => input,
            _ => ColumnKind::Numeric,
        }
    }

    fn reduce<'a, I>(&self, mut cells: I) -> Value
    where
        I: Iterator<Item = &'a Value>,
    {
        match self {
            Reducer::Count => Value::Int(cells.count() as i64),
            Reducer::Sum | Reducer::Mean => {
                let (sum, n) = cells
                    .filter_map(Value::as_f64)
                    .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
                match (self, n) {
                    (_, 0) => Value::Null,
                    (Reducer::Mean, n) => Value::Float(sum / n as f64),
                    _ => Value::Float(sum),
                }
            }
            Reducer::Min | Reducer::Max => {
                let want = if *self == Reducer::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                cells
                    .filter(|v| v.as_f64().is_some())
                    .fold(None::<&Value>, |best, v| match best {
                        Some(b) if v.total_cmp(b) != want => Some(b),
                        _ => Some(v),
                    })
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            Reducer::Mode => {
                let mut counts: HashMap<&Value, (usize, usize)> = HashMap::new();
                for (pos, v) in cells.filter(|v| !v.is_null()).enumerate() {
                    counts.entry(v).or_insert((0, pos)).0 += 1;
                }
                counts
                    .into_iter()
                    .min_by(|(_, (ca, fa)), (_, (cb, fb))| cb.cmp(ca).then(fa.cmp(fb)))
                    .map(|(v, _)| v.clone())
                    .unwrap_or(Value::Null)
            }
            Reducer::First => cells
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null),
            Reducer::Distinct => {
                let distinct: HashSet<&Value> = cells.filter(|v| !v.is_null()).collect();
                Value::Int(distinct.len() as i64)
            }
        }
    }
}

/// Output ordering of groups.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrder {
    #[default]
    FirstSeen,
    KeyAsc,
    ValueAsc,
    ValueDesc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub group_by: Vec<String>,
    pub metric: String,
    pub reducer: Reducer,
    #[serde(default)]
    pub order: GroupOrder,
    /// Keep the N groups with the largest reduced value (smallest under
    /// `ValueAsc`). The kept groups stay in `order`.
    #[serde(default)]
    pub top_n: Option<usize>,
}

impl AggregationSpec {
    pub fn new(group_by: &[&str], metric: &str, reducer: Reducer) -> Self {
        Self {
            group_by: group_by.iter().map(|s| s.to_string()).collect(),
            metric: metric.to_string(),
            reducer,
            order: GroupOrder::FirstSeen,
            top_n: None,
        }
    }

    pub fn ordered(mut self, order: GroupOrder) -> Self {
        self.order = order;
        self
    }

    pub fn top(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupResult {
    /// One value per group-by column; `Null` is the missing-value bucket.
    pub key: Vec<Value>,
    pub value: Value,
    /// Rows in the group.
    pub count: usize,
}

/// Group `view` and reduce the metric column. An empty view yields no groups.
pub fn aggregate(view: &View<'_>, spec: &AggregationSpec) -> EngineResult<Vec<GroupResult>> {
    let schema = view.table().schema();
    let group_idx = resolve_group_by(schema, &spec.group_by)?;
    let metric_idx = resolve_metric(schema, &spec.metric, spec.reducer)?;

    let mut results: Vec<GroupResult> = group_rows(view, &group_idx)
        .into_iter()
        .map(|(key, members)| GroupResult {
            value: spec
                .reducer
                .reduce(members.iter().map(|row| &row[metric_idx])),
            count: members.len(),
            key,
        })
        .collect();

    sort_groups(&mut results, spec.order, |g| g.key.as_slice(), |g| &g.value);
    if let Some(n) = spec.top_n {
        keep_top(&mut results, spec.order, n, |g| g.key.as_slice(), |g| &g.value);
    }
    Ok(results)
}

/// Row count per distinct value of `column`, most frequent first.
pub fn value_counts(view: &View<'_>, column: &str) -> EngineResult<Vec<GroupResult>> {
    aggregate(
        view,
        &AggregationSpec::new(&[column], column, Reducer::Count).ordered(GroupOrder::ValueDesc),
    )
}

/// One reduced column of a multi-metric summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub column: String,
    pub reducer: Reducer,
}

impl MetricSpec {
    pub fn new(column: &str, reducer: Reducer) -> Self {
        Self {
            column: column.to_string(),
            reducer,
        }
    }

    /// Output column label, e.g. `sum(Nombre de logements)`.
    pub fn label(&self) -> String {
        format!("{}({})", self.reducer.as_str(), self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummarySpec {
    pub group_by: Vec<String>,
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub order: GroupOrder,
    /// Index into `metrics` used by value orderings.
    #[serde(default)]
    pub sort_metric: usize,
    /// Ranked on `sort_metric`, as in [`AggregationSpec::top_n`].
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    pub key: Vec<Value>,
    pub values: Vec<Value>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub group_by: Vec<String>,
    pub metrics: Vec<String>,
    pub rows: Vec<SummaryRow>,
    #[serde(skip)]
    kinds: Vec<ColumnKind>,
}

impl Summary {
    /// Materialise as a table (`group_by…, metrics…, count`) for export.
    pub fn to_table(&self) -> EngineResult<Table> {
        let columns = self
            .group_by
            .iter()
            .chain(self.metrics.iter())
            .zip(self.kinds.iter())
            .map(|(name, kind)| Column {
                name: name.clone(),
                kind: *kind,
            })
            .chain(std::iter::once(Column {
                name: "count".to_string(),
                kind: ColumnKind::Numeric,
            }))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = r.key.clone();
                row.extend(r.values.iter().cloned());
                row.push(Value::Int(r.count as i64));
                row
            })
            .collect();
        Table::new(Schema::new(columns)?, rows)
    }
}

/// Several reducers sharing one grouping pass.
pub fn summarize(view: &View<'_>, spec: &SummarySpec) -> EngineResult<Summary> {
    let schema = view.table().schema();
    let group_idx = resolve_group_by(schema, &spec.group_by)?;
    if spec.metrics.is_empty() {
        return Err(EngineError::invalid("summary needs at least one metric"));
    }
    if spec.sort_metric >= spec.metrics.len() {
        return Err(EngineError::invalid(format!(
            "sort_metric {} is out of range for {} metrics",
            spec.sort_metric,
            spec.metrics.len()
        )));
    }
    let metric_idx = spec
        .metrics
        .iter()
        .map(|m| resolve_metric(schema, &m.column, m.reducer))
        .collect::<EngineResult<Vec<_>>>()?;

    let mut rows: Vec<SummaryRow> = group_rows(view, &group_idx)
        .into_iter()
        .map(|(key, members)| SummaryRow {
            values: spec
                .metrics
                .iter()
                .zip(&metric_idx)
                .map(|(m, &ci)| m.reducer.reduce(members.iter().map(|row| &row[ci])))
                .collect(),
            count: members.len(),
            key,
        })
        .collect();

    let sort_at = spec.sort_metric;
    sort_groups(&mut rows, spec.order, |r| r.key.as_slice(), |r| &r.values[sort_at]);
    if let Some(n) = spec.top_n {
        keep_top(&mut rows, spec.order, n, |r| r.key.as_slice(), |r| &r.values[sort_at]);
    }

    let columns = schema.columns();
    let kinds = group_idx
        .iter()
        .map(|&i| columns[i].kind)
        .chain(
            spec.metrics
                .iter()
                .zip(&metric_idx)
                .map(|(m, &ci)| m.reducer.output_kind(columns[ci].kind)),
        )
        .collect();

    Ok(Summary {
        group_by: spec.group_by.clone(),
        metrics: spec.metrics.iter().map(MetricSpec::label).collect(),
        rows,
        kinds,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bin {
    pub label: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Binned {
    pub bins: Vec<Bin>,
    /// Missing values and values outside every interval.
    pub outside: usize,
}

/// Count rows per right-inclusive interval `(edges[i], edges[i + 1]]`.
pub fn bin(view: &View<'_>, column: &str, edges: &[f64], labels: &[&str]) -> EngineResult<Binned> {
    if edges.len() < 2 || edges.len() != labels.len() + 1 {
        return Err(EngineError::invalid(format!(
            "{} edges cannot describe {} bins",
            edges.len(),
            labels.len()
        )));
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(EngineError::invalid("bin edges must be strictly increasing"));
    }
    let ci = resolve_metric(view.table().schema(), column, Reducer::Sum)?;

    let mut counts = vec![0usize; labels.len()];
    let mut outside = 0;
    for row in view.rows() {
        let slot = row[ci]
            .as_f64()
            .and_then(|x| edges.windows(2).position(|w| x > w[0] && x <= w[1]));
        match slot {
            Some(i) => counts[i] += 1,
            None => outside += 1,
        }
    }

    Ok(Binned {
        bins: labels
            .iter()
            .zip(counts)
            .map(|(label, count)| Bin {
                label: label.to_string(),
                count,
            })
            .collect(),
        outside,
    })
}

/// Descriptive statistics of one numeric column.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: usize,
    pub missing: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn column_stats(view: &View<'_>, column: &str) -> EngineResult<ColumnStats> {
    let ci = resolve_metric(view.table().schema(), column, Reducer::Sum)?;
    let mut stats = ColumnStats::default();
    for row in view.rows() {
        match row[ci].as_f64() {
            Some(x) => {
                stats.count += 1;
                stats.sum += x;
                stats.min = Some(stats.min.map_or(x, |m| m.min(x)));
                stats.max = Some(stats.max.map_or(x, |m| m.max(x)));
            }
            None => stats.missing += 1,
        }
    }
    if stats.count > 0 {
        stats.mean = Some(stats.sum / stats.count as f64);
    }
    Ok(stats)
}

fn resolve_group_by(schema: &Schema, group_by: &[String]) -> EngineResult<Vec<usize>> {
    group_by
        .iter()
        .map(|name| schema.require(name).map(|(i, _)| i))
        .collect()
}

fn resolve_metric(schema: &Schema, metric: &str, reducer: Reducer) -> EngineResult<usize> {
    let (idx, col) = schema.require(metric)?;
    if reducer.requires_numeric() && !col.kind.is_numeric() {
        return Err(EngineError::SchemaError {
            column: metric.to_string(),
            reason: "is not numeric",
        });
    }
    Ok(idx)
}

/// Partition view rows by key, groups and members in first-seen order.
fn group_rows<'t>(view: &View<'t>, group_idx: &[usize]) -> Vec<(Vec<Value>, Vec<&'t [Value]>)> {
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<&'t [Value]>)> = Vec::new();
    for row in view.rows() {
        let key: Vec<Value> = group_idx.iter().map(|&i| row[i].clone()).collect();
        match index.get(&key) {
            Some(&g) => groups[g].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups
}

fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn sort_groups<T, K, V>(items: &mut [T], order: GroupOrder, key: K, value: V)
where
    K: Fn(&T) -> &[Value],
    V: Fn(&T) -> &Value,
{
    match order {
        GroupOrder::FirstSeen => {}
        GroupOrder::KeyAsc => items.sort_by(|a, b| cmp_keys(key(a), key(b))),
        GroupOrder::ValueAsc | GroupOrder::ValueDesc => {
            let desc = order == GroupOrder::ValueDesc;
            items.sort_by(|a, b| cmp_by_value(a, b, desc, &key, &value))
        }
    }
}

/// Null values last, equal values broken by group key.
fn cmp_by_value<T, K, V>(a: &T, b: &T, desc: bool, key: &K, value: &V) -> Ordering
where
    K: Fn(&T) -> &[Value],
    V: Fn(&T) -> &Value,
{
    let (va, vb) = (value(a), value(b));
    let by_value = match (va.is_null(), vb.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if desc => vb.total_cmp(va),
        (false, false) => va.total_cmp(vb),
    };
    by_value.then_with(|| cmp_keys(key(a), key(b)))
}

/// Truncate to the `n` best-valued groups without disturbing `order`.
fn keep_top<T, K, V>(items: &mut Vec<T>, order: GroupOrder, n: usize, key: K, value: V)
where
    K: Fn(&T) -> &[Value],
    V: Fn(&T) -> &Value,
{
    if matches!(order, GroupOrder::ValueAsc | GroupOrder::ValueDesc) {
        items.truncate(n);
        return;
    }
    let mut ranked: Vec<usize> = (0..items.len()).collect();
    ranked.sort_by(|&a, &b| cmp_by_value(&items[a], &items[b], true, &key, &value));
    let kept: HashSet<usize> = ranked.into_iter().take(n).collect();
    let mut pos = 0;
    items.retain(|_| {
        let keep = kept.contains(&pos);
        pos += 1;
        keep
    });
}
