use url::Url;

use crate::error::AppError;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;
/// The store binds offsets as signed 64-bit integers.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageParams {
    pub limit: u64,
    pub offset: u64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageParams {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Result<Self, AppError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }
        let offset = offset.unwrap_or(0);
        if offset > MAX_OFFSET {
            return Err(AppError::InvalidInput(format!(
                "offset must be at most {MAX_OFFSET}, got {offset}"
            )));
        }
        Ok(Self { limit, offset })
    }

    /// Offset of the following page, or `None` once `offset + limit` covers `total`.
    pub fn next_offset(&self, total: u64) -> Option<u64> {
        let end = self.offset.saturating_add(self.limit);
        if end >= total {
            None
        } else {
            Some(end)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub params: PageParams,
}

impl<T> Page<T> {
    pub fn empty(params: PageParams) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            params,
        }
    }

    pub fn next_offset(&self) -> Option<u64> {
        self.params.next_offset(self.total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            params: self.params,
        }
    }
}

/// Rewrites `current` to point at the next page, keeping every other query
/// parameter as it was.
pub fn build_next_url(current: &Url, params: PageParams, total: u64) -> Option<Url> {
    let next = params.next_offset(total)?;
    let kept: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(key, _)| key != "limit" && key != "offset")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = current.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query.append_pair("offset", &next.to_string());
        query.append_pair("limit", &params.limit.to_string());
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let params = PageParams::new(None, None).expect("params");
        assert_eq!(params, PageParams::default());
        assert_eq!(params.limit, 20);
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        assert!(matches!(
            PageParams::new(Some(0), None),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            PageParams::new(Some(101), None),
            Err(AppError::InvalidInput(_))
        ));
        assert!(PageParams::new(Some(100), Some(7)).is_ok());
    }

    #[test]
    fn offset_beyond_signed_range_is_rejected() {
        assert!(matches!(
            PageParams::new(None, Some(u64::MAX)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            PageParams::new(None, Some(MAX_OFFSET + 1)),
            Err(AppError::InvalidInput(_))
        ));
        let params = PageParams::new(None, Some(MAX_OFFSET)).expect("largest offset");
        assert_eq!(params.next_offset(10), None);
    }

    #[test]
    fn next_offset_stops_at_total() {
        let params = PageParams::new(Some(10), Some(0)).expect("params");
        assert_eq!(params.next_offset(25), Some(10));
        assert_eq!(params.next_offset(10), None);
        assert_eq!(params.next_offset(0), None);

        let last = PageParams::new(Some(10), Some(20)).expect("params");
        assert_eq!(last.next_offset(25), None);
        let middle = PageParams::new(Some(10), Some(14)).expect("params");
        assert_eq!(middle.next_offset(25), Some(24));
    }

    #[test]
    fn walking_pages_visits_each_item_once() {
        let total = 47u64;
        let limit = 10u64;
        let mut seen = Vec::new();
        let mut offset = Some(0);
        while let Some(current) = offset {
            let params = PageParams::new(Some(limit), Some(current)).expect("params");
            let end = (current + limit).min(total);
            seen.extend(current..end);
            offset = params.next_offset(total);
        }
        assert_eq!(seen, (0..total).collect::<Vec<_>>());
    }

    #[test]
    fn next_url_preserves_other_parameters() {
        let current = Url::parse("http://localhost:8000/missions?completed=false&limit=2")
            .expect("url");
        let params = PageParams::new(Some(2), None).expect("params");
        let next = build_next_url(&current, params, 5).expect("next url");
        assert_eq!(
            next.as_str(),
            "http://localhost:8000/missions?completed=false&offset=2&limit=2"
        );
        assert!(build_next_url(&current, params, 2).is_none());
    }
}
