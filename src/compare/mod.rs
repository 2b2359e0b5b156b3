pub(crate) mod comparator;
pub(crate) mod metric;
