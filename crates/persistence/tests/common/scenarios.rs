//! Query behavior every backend must share.
//!
//! Each scenario takes an empty client repository, seeds the fixtures and
//! checks one property. Backend test files run them against their own
//! storage so the expectations stay identical across backends.

use mercator_persistence::error::ErrorKind;
use mercator_persistence::types::{
    DateOperator, FieldValue, ListOperator, ListQuery, ListResult, NullOrder, NumberOperator,
    PaginationRequest, RecordInput, SearchRequest, SortField, StringOperator, TypedFilter,
    parse_timestamp,
};
use mercator_persistence::{CallContext, Repository};

use super::assertions::{assert_error_kind, assert_page, assert_page_unordered};
use super::fixtures::{CLIENTS, client_id, seed_clients};

fn all() -> PaginationRequest {
    PaginationRequest::page(1, 100)
}

async fn filtered(repo: &Repository, ctx: &CallContext, filter: TypedFilter) -> ListResult {
    let query = ListQuery::new().with_filter(filter).with_pagination(all());
    repo.list(ctx, &query).await.unwrap()
}

pub async fn crud_round_trip(repo: &Repository) {
    let ctx = CallContext::background();
    let created = repo
        .create(
            &ctx,
            RecordInput::new()
                .with_field("name", "Acme Corp")
                .with_field("priority", 3.0)
                .with_field("verified", true),
        )
        .await
        .unwrap();
    assert_eq!(created.id(), client_id(1));
    assert!(created.is_active());
    assert_eq!(created.date_created(), created.date_modified());

    let read = repo.read(&ctx, created.id()).await.unwrap();
    assert_eq!(read, created);

    let updated = repo
        .update(
            &ctx,
            created.id(),
            RecordInput::new().with_field("priority", 4.0),
        )
        .await
        .unwrap();
    assert_eq!(updated.date_created(), created.date_created());
    assert!(updated.date_modified() >= created.date_modified());
    assert_eq!(updated.get("priority").unwrap().as_f64(), Some(4.0));
    assert_eq!(updated.get("name").unwrap().as_str(), Some("Acme Corp"));

    assert!(repo.exists(&ctx, created.id()).await.unwrap());
    repo.hard_delete(&ctx, created.id()).await.unwrap();
    assert!(!repo.exists(&ctx, created.id()).await.unwrap());
    assert_error_kind(repo.read(&ctx, created.id()).await, ErrorKind::NotFound);
}

pub async fn explicit_id_and_duplicate(repo: &Repository) {
    let ctx = CallContext::background();
    let created = repo
        .create(&ctx, RecordInput::new().with_id("acme").with_field("name", "Acme"))
        .await
        .unwrap();
    assert_eq!(created.id(), "acme");

    assert_error_kind(
        repo.create(&ctx, RecordInput::new().with_id("acme").with_field("name", "Again"))
            .await,
        ErrorKind::Conflict,
    );
}

pub async fn null_field_clears_value(repo: &Repository) {
    let ctx = CallContext::background();
    let created = repo
        .create(
            &ctx,
            RecordInput::new()
                .with_field("name", "Hooli")
                .with_field("tier", "silver"),
        )
        .await
        .unwrap();

    let updated = repo
        .update(
            &ctx,
            created.id(),
            RecordInput::new().with_field("tier", FieldValue::Null),
        )
        .await
        .unwrap();
    assert!(updated.get("tier").is_none());
    assert_eq!(updated.get("name").unwrap().as_str(), Some("Hooli"));
}

pub async fn soft_delete_round_trip(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;
    let id = client_id(1);

    repo.delete(&ctx, &id).await.unwrap();
    assert_error_kind(repo.read(&ctx, &id).await, ErrorKind::NotFound);
    assert!(!repo.exists(&ctx, &id).await.unwrap());
    assert_error_kind(repo.delete(&ctx, &id).await, ErrorKind::NotFound);

    let page = repo
        .list(&ctx, &ListQuery::new().with_pagination(all()))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 10);
    assert!(!page.ids().contains(&id.as_str()));
    assert_eq!(repo.count(&ctx, &ListQuery::new()).await.unwrap(), 10);

    // Update writes the active flag, so it brings the record back.
    let restored = repo
        .update(&ctx, &id, RecordInput::new().with_field("tier", "platinum"))
        .await
        .unwrap();
    assert!(restored.is_active());
    assert_eq!(repo.read(&ctx, &id).await.unwrap().get("tier").unwrap().as_str(), Some("platinum"));
    assert_eq!(repo.count(&ctx, &ListQuery::new()).await.unwrap(), 11);

    repo.hard_delete(&ctx, &id).await.unwrap();
    assert_error_kind(
        repo.update(&ctx, &id, RecordInput::new().with_field("tier", "gold"))
            .await,
        ErrorKind::NotFound,
    );
    assert_error_kind(repo.hard_delete(&ctx, &id).await, ErrorKind::NotFound);
}

pub async fn contains_is_case_insensitive(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let query = ListQuery::new()
        .with_filter(TypedFilter::string("name", StringOperator::Contains, "OE", false))
        .with_pagination(all());
    let page = repo.list(&ctx, &query).await.unwrap();
    assert_page(&page, &[1, 3, 4]);

    let query = ListQuery::new()
        .with_filter(TypedFilter::string("name", StringOperator::Contains, "OE", true))
        .with_pagination(all());
    assert!(repo.list(&ctx, &query).await.unwrap().records.is_empty());
}

pub async fn string_operators(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let page = filtered(repo, &ctx, TypedFilter::string("name", StringOperator::StartsWith, "s", false)).await;
    assert_page(&page, &[9, 11]);

    let page = filtered(repo, &ctx, TypedFilter::string("name", StringOperator::EndsWith, "CORP", false)).await;
    assert_page(&page, &[2]);

    let page = filtered(repo, &ctx, TypedFilter::string("tier", StringOperator::Equals, "gold", true)).await;
    assert_page(&page, &[1, 3, 7, 9, 10]);

    let page = filtered(repo, &ctx, TypedFilter::string("tier", StringOperator::NotEquals, "GOLD", false)).await;
    assert_page(&page, &[2, 4, 5, 6, 8, 11]);

    let page = filtered(repo, &ctx, TypedFilter::string("name", StringOperator::Regex, "^(joe|moe)'s", false)).await;
    assert_page(&page, &[1, 4]);

    let page = filtered(repo, &ctx, TypedFilter::string("email", StringOperator::Regex, r"@corp\.test$", true)).await;
    assert_page(&page, &[2, 5, 6, 7, 11]);
}

pub async fn range_is_inclusive_and_skips_nulls(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let query = ListQuery::new()
        .with_filter(TypedFilter::range("priority", 10.0, 15.0, true, true))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[1, 2, 3, 7, 11]);

    let query = ListQuery::new()
        .with_filter(TypedFilter::range("priority", 10.0, 15.0, false, false))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[3, 11]);

    let query = ListQuery::new()
        .with_filter(TypedFilter::number("priority", NumberOperator::Gt, 20.0))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[9, 10]);

    // A null never satisfies NOT_EQUALS either.
    let query = ListQuery::new()
        .with_filter(TypedFilter::number("priority", NumberOperator::NotEquals, 15.0))
        .with_pagination(all());
    assert_eq!(repo.count(&ctx, &query).await.unwrap(), 8);
}

pub async fn list_filters(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let empty: [&str; 0] = [];
    let query = ListQuery::new()
        .with_filter(TypedFilter::list("tier", ListOperator::In, empty))
        .with_pagination(all());
    assert_eq!(repo.list(&ctx, &query).await.unwrap().records.len(), CLIENTS.len());

    let query = ListQuery::new()
        .with_filter(TypedFilter::list("tier", ListOperator::In, ["gold", "silver"]))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[1, 2, 3, 5, 7, 8, 9, 10]);

    let query = ListQuery::new()
        .with_filter(TypedFilter::list("tier", ListOperator::NotIn, ["gold"]))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[2, 4, 5, 6, 8, 11]);
}

pub async fn boolean_and_date_filters(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let query = ListQuery::new()
        .with_filter(TypedFilter::boolean("verified", true))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[1, 3, 4, 6, 8, 9]);

    let start = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
    let end = parse_timestamp("2024-02-28T00:00:00Z").unwrap();
    let query = ListQuery::new()
        .with_filter(TypedFilter::date("dueAt", DateOperator::Between, start, Some(end)))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[1, 2, 5, 11]);

    let feb = parse_timestamp("2024-02-01T00:00:00Z").unwrap();
    let query = ListQuery::new()
        .with_filter(TypedFilter::date("dueAt", DateOperator::Before, feb, None))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[1, 5]);

    let query = ListQuery::new()
        .with_filter(TypedFilter::date("dueAt", DateOperator::Equals, end, None))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &query).await.unwrap(), &[11]);

    // BETWEEN without an end adds no condition.
    let query = ListQuery::new()
        .with_filter(TypedFilter::date("dueAt", DateOperator::Between, start, None))
        .with_pagination(all());
    assert_eq!(repo.count(&ctx, &query).await.unwrap(), 11);
}

pub async fn multi_key_sort_with_nulls(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let query = ListQuery::new()
        .with_sort(SortField::asc("tier"))
        .with_sort(SortField::desc("priority"))
        .with_pagination(all());
    assert_page(
        &repo.list(&ctx, &query).await.unwrap(),
        &[6, 11, 4, 9, 10, 7, 3, 1, 5, 2, 8],
    );

    let query = ListQuery::new()
        .with_sort(SortField::desc("priority").with_null_order(NullOrder::NullsLast))
        .with_pagination(all());
    assert_page(
        &repo.list(&ctx, &query).await.unwrap(),
        &[9, 10, 6, 2, 7, 3, 11, 1, 8, 4, 5],
    );

    let query = ListQuery::new()
        .with_sort(SortField::asc("name"))
        .with_pagination(all());
    assert_page(
        &repo.list(&ctx, &query).await.unwrap(),
        &[2, 5, 8, 6, 1, 4, 11, 9, 7, 10, 3],
    );
}

pub async fn ties_break_on_creation_order(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let query = ListQuery::new()
        .with_sort(SortField::desc("priority"))
        .with_pagination(all());
    let first = repo.list(&ctx, &query).await.unwrap();
    assert_page(&first, &[5, 9, 10, 6, 2, 7, 3, 11, 1, 8, 4]);

    let again = repo.list(&ctx, &query).await.unwrap();
    assert_eq!(first.ids(), again.ids());

    let query = ListQuery::new()
        .with_sort(SortField::asc("tier"))
        .with_pagination(all());
    assert_page(
        &repo.list(&ctx, &query).await.unwrap(),
        &[4, 6, 11, 1, 3, 7, 9, 10, 2, 5, 8],
    );
}

pub async fn offset_pagination(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let page = |n: u32| ListQuery::new().with_pagination(PaginationRequest::page(n, 5));

    let first = repo.list(&ctx, &page(1)).await.unwrap();
    assert_page(&first, &[1, 2, 3, 4, 5]);
    assert_eq!(first.pagination.total_items, 11);
    assert_eq!(first.pagination.total_pages, 3);
    assert!(first.pagination.has_next);
    assert!(!first.pagination.has_prev);
    assert!(first.pagination.next_cursor.is_none());

    let second = repo.list(&ctx, &page(2)).await.unwrap();
    assert_page(&second, &[6, 7, 8, 9, 10]);
    assert!(second.pagination.has_next);
    assert!(second.pagination.has_prev);

    let third = repo.list(&ctx, &page(3)).await.unwrap();
    assert_page(&third, &[11]);
    assert_eq!(third.pagination.current_page, 3);
    assert!(!third.pagination.has_next);
    assert!(third.pagination.has_prev);

    let beyond = repo.list(&ctx, &page(9)).await.unwrap();
    assert!(beyond.records.is_empty());
    assert_eq!(beyond.pagination.total_items, 11);
    assert!(!beyond.pagination.has_next);

    assert_error_kind(
        repo.list(&ctx, &ListQuery::new().with_pagination(PaginationRequest::page(0, 5)))
            .await,
        ErrorKind::Validation,
    );
}

pub async fn cursor_pagination(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let mut seen = Vec::new();
    let mut token = String::new();
    loop {
        let query = ListQuery::new().with_pagination(PaginationRequest::cursor(token.clone(), 5));
        let page = repo.list(&ctx, &query).await.unwrap();
        seen.extend(page.ids().into_iter().map(String::from));
        match page.pagination.next_cursor {
            Some(next) => token = next,
            None => break,
        }
    }

    let expected: Vec<String> = (1..=11).map(client_id).collect();
    assert_eq!(seen, expected);

    let first = repo
        .list(
            &ctx,
            &ListQuery::new().with_pagination(PaginationRequest::cursor("", 5)),
        )
        .await
        .unwrap();
    assert!(first.pagination.previous_cursor.is_none());
    assert!(first.pagination.next_cursor.is_some());

    assert_error_kind(
        repo.list(
            &ctx,
            &ListQuery::new().with_pagination(PaginationRequest::cursor("not a cursor!", 5)),
        )
        .await,
        ErrorKind::Validation,
    );
}

pub async fn search_with_cap(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let search = SearchRequest::new("CORP", ["name", "email"]);
    let query = ListQuery::new()
        .with_search(search.clone())
        .with_pagination(all());
    let page = repo.list(&ctx, &query).await.unwrap();
    assert_page_unordered(&page, &[2, 5, 6, 7, 11]);
    assert_eq!(page.matches.len(), page.records.len());

    let acme = page
        .matches
        .iter()
        .find(|m| m.id == client_id(2))
        .expect("acme matched");
    // "Acme Corp" and "acme@corp.test", neither starting with the query.
    assert_eq!(acme.score, 2.0);
    assert_eq!(acme.highlights.len(), 2);
    assert_eq!(acme.highlights[0].field, "name");
    assert_eq!((acme.highlights[1].start, acme.highlights[1].end), (5, 9));

    let capped = ListQuery::new()
        .with_search(search.with_max_results(2))
        .with_pagination(all());
    let page = repo.list(&ctx, &capped).await.unwrap();
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.pagination.total_items, 2);
    assert_eq!(repo.count(&ctx, &capped).await.unwrap(), 2);

    let combined = ListQuery::new()
        .with_search(SearchRequest::new("corp", ["email"]))
        .with_filter(TypedFilter::boolean("verified", true))
        .with_pagination(all());
    assert_page(&repo.list(&ctx, &combined).await.unwrap(), &[6]);
}

pub async fn invalid_queries_are_rejected(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let unknown = ListQuery::new().with_filter(TypedFilter::string(
        "password",
        StringOperator::Equals,
        "x",
        true,
    ));
    assert_error_kind(repo.list(&ctx, &unknown).await, ErrorKind::Validation);

    let mismatched = ListQuery::new().with_filter(TypedFilter::string(
        "priority",
        StringOperator::Equals,
        "high",
        true,
    ));
    assert_error_kind(repo.list(&ctx, &mismatched).await, ErrorKind::Validation);

    let bad_regex = ListQuery::new().with_filter(TypedFilter::string(
        "name",
        StringOperator::Regex,
        "(unclosed",
        true,
    ));
    assert_error_kind(repo.list(&ctx, &bad_regex).await, ErrorKind::Validation);

    let bad_sort = ListQuery::new().with_sort(SortField::asc("nope"));
    assert_error_kind(repo.list(&ctx, &bad_sort).await, ErrorKind::Validation);

    let bad_search = ListQuery::new().with_search(SearchRequest::new("x", ["priority"]));
    assert_error_kind(repo.list(&ctx, &bad_search).await, ErrorKind::Validation);
}

pub async fn cancelled_context_fails_fast(repo: &Repository) {
    let ctx = CallContext::background();
    seed_clients(repo, &ctx).await;

    let cancelled = CallContext::background();
    cancelled.cancel();
    super::assertions::assert_cancelled(repo.list(&cancelled, &ListQuery::new()).await);
    super::assertions::assert_cancelled(repo.read(&cancelled, &client_id(1)).await);

    let expired = CallContext::background().with_timeout(std::time::Duration::ZERO);
    super::assertions::assert_deadline_exceeded(repo.count(&expired, &ListQuery::new()).await);

    // Nothing was written by the aborted calls.
    assert_eq!(repo.count(&ctx, &ListQuery::new()).await.unwrap(), 11);
}
