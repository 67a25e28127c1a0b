//! Pagination types.
//!
//! Two request modes are supported: offset mode (`page` + `limit`) and cursor
//! mode (opaque `token` + `limit`). Both resolve to the same offset/limit
//! window, so callers observe one response shape whichever mode they use.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when the request does not name one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

const CURSOR_VERSION: u8 = 1;

/// Largest offset a cursor may carry; SQL binds offsets as signed 64-bit.
const MAX_CURSOR_OFFSET: u64 = i64::MAX as u64;

/// How the requested page is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationMode {
    /// One-based page number.
    Offset { page: u32 },
    /// Opaque cursor token; empty means the first page.
    Cursor { token: String },
}

/// Pagination configuration for a list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaginationRequestWire", into = "PaginationRequestWire")]
pub struct PaginationRequest {
    /// Maximum number of records per page.
    pub limit: u32,

    /// The pagination mode.
    pub mode: PaginationMode,
}

impl Default for PaginationRequest {
    fn default() -> Self {
        Self::page(1, DEFAULT_PAGE_LIMIT)
    }
}

impl PaginationRequest {
    /// Offset mode.
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            limit,
            mode: PaginationMode::Offset { page },
        }
    }

    /// Cursor mode.
    pub fn cursor(token: impl Into<String>, limit: u32) -> Self {
        Self {
            limit,
            mode: PaginationMode::Cursor {
                token: token.into(),
            },
        }
    }

    /// Returns true in cursor mode.
    pub fn is_cursor(&self) -> bool {
        matches!(self.mode, PaginationMode::Cursor { .. })
    }

    /// Checks the limit and page number, and that a cursor token decodes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(ValidationError::InvalidPagination {
                message: format!(
                    "limit must be between 1 and {}, got {}",
                    MAX_PAGE_LIMIT, self.limit
                ),
            });
        }
        match &self.mode {
            PaginationMode::Offset { page } if *page == 0 => {
                Err(ValidationError::InvalidPagination {
                    message: "page must be at least 1".to_string(),
                })
            }
            PaginationMode::Cursor { token } => PageCursor::decode_token(token).map(|_| ()),
            PaginationMode::Offset { .. } => Ok(()),
        }
    }

    /// Returns the zero-based offset of the first record on the page.
    pub fn offset(&self) -> Result<u64, ValidationError> {
        match &self.mode {
            PaginationMode::Offset { page } => {
                Ok(u64::from(page.saturating_sub(1)) * u64::from(self.limit))
            }
            PaginationMode::Cursor { token } => {
                Ok(PageCursor::decode_token(token)?.map_or(0, |c| c.offset()))
            }
        }
    }
}

/// An opaque position in a result set.
///
/// Cursors are URL-safe base64 JSON carrying a format version and the offset
/// of the first record on the page they address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Cursor format version.
    version: u8,

    /// Zero-based offset of the first record.
    offset: u64,
}

impl PageCursor {
    /// Creates a cursor pointing at `offset`.
    pub fn new(offset: u64) -> Self {
        Self {
            version: CURSOR_VERSION,
            offset,
        }
    }

    /// Returns the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCursor {
            cursor: s.to_string(),
        };

        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if cursor.version != CURSOR_VERSION || cursor.offset > MAX_CURSOR_OFFSET {
            return Err(invalid());
        }
        Ok(cursor)
    }

    /// Decodes a request token; an empty token addresses the first page.
    pub fn decode_token(token: &str) -> Result<Option<Self>, ValidationError> {
        if token.is_empty() {
            Ok(None)
        } else {
            Self::decode(token).map(Some)
        }
    }
}

/// Pagination metadata returned with every list result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResponse {
    pub total_items: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,

    /// Token for the next page (cursor mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,

    /// Token for the previous page (cursor mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_cursor: Option<String>,
}

/// JSON shape of a [`PaginationRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationRequestWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<OffsetWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetWire {
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorWire {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TryFrom<PaginationRequestWire> for PaginationRequest {
    type Error = ValidationError;

    fn try_from(wire: PaginationRequestWire) -> Result<Self, Self::Error> {
        let limit = wire.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        match (wire.offset, wire.cursor) {
            (Some(_), Some(_)) => Err(ValidationError::InvalidPagination {
                message: "offset and cursor are mutually exclusive".to_string(),
            }),
            (Some(offset), None) => Ok(Self::page(offset.page, limit)),
            (None, Some(cursor)) => Ok(Self::cursor(cursor.token, cursor.limit.unwrap_or(limit))),
            (None, None) => Ok(Self::page(1, limit)),
        }
    }
}

impl From<PaginationRequest> for PaginationRequestWire {
    fn from(request: PaginationRequest) -> Self {
        match request.mode {
            PaginationMode::Offset { page } => PaginationRequestWire {
                limit: Some(request.limit),
                offset: Some(OffsetWire { page }),
                cursor: None,
            },
            PaginationMode::Cursor { token } => PaginationRequestWire {
                limit: Some(request.limit),
                offset: None,
                cursor: Some(CursorWire {
                    token,
                    limit: Some(request.limit),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = PageCursor::new(40);
        let encoded = cursor.encode();
        let decoded = PageCursor::decode(&encoded).unwrap();
        assert_eq!(decoded.offset(), 40);
    }

    #[test]
    fn test_invalid_cursor() {
        assert!(matches!(
            PageCursor::decode("not-a-cursor!"),
            Err(ValidationError::InvalidCursor { .. })
        ));
        assert_eq!(PageCursor::decode_token("").unwrap(), None);
    }

    #[test]
    fn test_cursor_offset_out_of_range() {
        let token = PageCursor::new(u64::MAX).encode();
        assert!(matches!(
            PaginationRequest::cursor(token, 1).validate(),
            Err(ValidationError::InvalidCursor { .. })
        ));
        let token = PageCursor::new(MAX_CURSOR_OFFSET).encode();
        assert!(PaginationRequest::cursor(token, 1).validate().is_ok());
    }

    #[test]
    fn test_limit_bounds() {
        assert!(PaginationRequest::page(1, 0).validate().is_err());
        assert!(PaginationRequest::page(1, 101).validate().is_err());
        assert!(PaginationRequest::page(1, 100).validate().is_ok());
        assert!(PaginationRequest::page(0, 10).validate().is_err());
    }

    #[test]
    fn test_offset_from_page_and_cursor() {
        assert_eq!(PaginationRequest::page(3, 5).offset().unwrap(), 10);
        let token = PageCursor::new(15).encode();
        assert_eq!(PaginationRequest::cursor(token, 5).offset().unwrap(), 15);
        assert_eq!(PaginationRequest::cursor("", 5).offset().unwrap(), 0);
    }

    #[test]
    fn test_decode_wire_shapes() {
        let request: PaginationRequest =
            serde_json::from_value(json!({"limit": 5, "offset": {"page": 2}})).unwrap();
        assert_eq!(request, PaginationRequest::page(2, 5));

        let request: PaginationRequest =
            serde_json::from_value(json!({"cursor": {"token": "", "limit": 7}})).unwrap();
        assert_eq!(request, PaginationRequest::cursor("", 7));

        let request: PaginationRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request, PaginationRequest::default());
    }
}
