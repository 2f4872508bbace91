//! Query engine: filtered views and aggregations over loaded tables.

pub mod aggregate;
pub mod filter;
pub mod view;

pub use aggregate::{
    aggregate, bin, column_stats, summarize, value_counts, AggregationSpec, GroupOrder,
    GroupResult, MetricSpec, Reducer, Summary, SummarySpec,
};
pub use filter::{FilterSet, Predicate, PredicateOp};
pub use view::View;
