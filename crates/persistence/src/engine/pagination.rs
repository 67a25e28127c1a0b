//! Pagination calculator.
//!
//! Shared by the in-memory evaluator and the relational backends so both
//! produce the same [`PaginationResponse`] for the same total.

use crate::error::ValidationError;
use crate::types::{PageCursor, PaginationMode, PaginationRequest, PaginationResponse};

/// The resolved offset/limit window of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u32,
}

impl PageWindow {
    /// Resolves a validated request into a window.
    pub fn resolve(request: &PaginationRequest) -> Result<Self, ValidationError> {
        request.validate()?;
        Ok(Self {
            offset: request.offset()?,
            limit: request.limit,
        })
    }

    /// Returns the number of rows on this page given `total` matching rows.
    pub fn len(&self, total: u64) -> u64 {
        total
            .saturating_sub(self.offset)
            .min(u64::from(self.limit))
    }

    /// Returns true if the page holds no rows.
    pub fn is_empty(&self, total: u64) -> bool {
        self.len(total) == 0
    }

    /// Returns the slice bounds of this page within `total` rows.
    pub fn bounds(&self, total: u64) -> (usize, usize) {
        let start = self.offset.min(total);
        let end = start + self.len(total);
        (
            usize::try_from(start).unwrap_or(usize::MAX),
            usize::try_from(end).unwrap_or(usize::MAX),
        )
    }
}

/// `max(1, ceil(total_items / limit))`
pub fn total_pages(total_items: u64, limit: u32) -> u32 {
    let limit = u64::from(limit.max(1));
    let pages = total_items.div_ceil(limit).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Computes the response metadata for a page.
///
/// `current_page` is the requested page in offset mode and
/// `offset / limit + 1` in cursor mode.
pub fn calculate(
    request: &PaginationRequest,
    window: PageWindow,
    total_items: u64,
) -> PaginationResponse {
    let limit = window.limit.max(1);
    let current_page = match request.mode {
        PaginationMode::Offset { page } => page,
        PaginationMode::Cursor { .. } => {
            let page = (window.offset / u64::from(limit)).saturating_add(1);
            u32::try_from(page).unwrap_or(u32::MAX)
        }
    };
    let total_pages = total_pages(total_items, limit);
    let has_next = current_page < total_pages;
    let has_prev = current_page > 1;

    let (next_cursor, previous_cursor) = if request.is_cursor() {
        (
            has_next.then(|| {
                PageCursor::new(window.offset.saturating_add(u64::from(limit))).encode()
            }),
            has_prev.then(|| {
                PageCursor::new(window.offset.saturating_sub(u64::from(limit))).encode()
            }),
        )
    } else {
        (None, None)
    };

    PaginationResponse {
        total_items,
        current_page,
        total_pages,
        has_next,
        has_prev,
        next_cursor,
        previous_cursor,
    }
}
