//! Relational filtered query

use super::record::RecordKind;
use super::time_range::TimeRange;
use crate::error::Result;
use crate::storage::queries::NEWEST_FIRST;
use crate::storage::{RelationalStore, SqlBuilder};
use crate::types::SearchRequest;

/// Records of kind `K` in the request's project, newest first
///
/// With `include_free_text` the trimmed query text must appear in one of the
/// kind's text fields; without it the text is ignored and only the exact
/// filters and time range apply. At most `limit_override` (or
/// `request.limit`) records are returned.
pub fn filtered_query<K: RecordKind>(
    store: &dyn RelationalStore,
    request: &SearchRequest<K::Filters>,
    range: &TimeRange,
    include_free_text: bool,
    limit_override: Option<usize>,
) -> Result<Vec<K::Record>> {
    let builder = scoped_builder::<K>(store, request, range, include_free_text);
    let limit = limit_override.unwrap_or(request.limit);
    let query = builder.select(K::COLUMNS, K::TABLE, Some(NEWEST_FIRST), Some(limit));

    store.fetch_rows(&query)?.iter().map(K::from_row).collect()
}

/// Project, optional text match, exact filters and time range for `K`
///
/// Shared by the filtered query and hydration so both paths enforce the
/// same predicates in the store's own dialect.
pub(super) fn scoped_builder<K: RecordKind>(
    store: &dyn RelationalStore,
    request: &SearchRequest<K::Filters>,
    range: &TimeRange,
    include_free_text: bool,
) -> SqlBuilder {
    let mut builder = SqlBuilder::new(store.dialect());
    builder.eq("project", request.project.as_str());

    if include_free_text {
        if let Some(text) = request.query_text() {
            K::push_text_match(&mut builder, text);
        }
    }

    K::push_filters(&mut builder, &request.filters);
    range.push_bounds(&mut builder, "created_at_epoch");
    builder
}
