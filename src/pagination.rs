/// Page size used when none (or a non-positive one) is requested.
pub const DEFAULT_LIMIT: i64 = 20;

/// Largest page size a listing will return.
pub const MAX_LIMIT: i64 = 100;

/// Limit and offset of a listing request, clamped to sane values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Missing or non-positive limits become [`DEFAULT_LIMIT`], limits above
    /// [`MAX_LIMIT`] are capped, and negative offsets become zero.
    pub fn clamped(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > MAX_LIMIT => MAX_LIMIT,
            Some(l) if l > 0 => l,
            _ => DEFAULT_LIMIT,
        };

        Self {
            limit,
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}
