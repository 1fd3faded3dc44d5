//! Paging and sorting for list operations.
//!
//! # Purpose
//! Turn caller-supplied page, page size and sort strings into a validated
//! [`Filters`] value the store backends can trust, and describe the resulting
//! window with [`Metadata`].
//!
//! # Key invariants
//! - Sort columns only ever come from a hard-coded allow-list, so backends may
//!   splice [`SortKey::column`] into SQL.
//! - Rows with equal sort values are ordered by `id` ascending.
//! - An empty result never divides by zero: first, last and total are zero
//!   while the requested page and page size are echoed back.
use crate::validation::ValidationErrors;
use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort keys accepted when listing accounts.
pub const ACCOUNT_SORT_SAFELIST: &[&str] = &[
    "id",
    "balance_in_cents",
    "frozen",
    "-id",
    "-balance_in_cents",
    "-frozen",
];

/// Sort keys accepted when listing cards.
pub const CARD_SORT_SAFELIST: &[&str] = &["id", "expiry", "-id", "-expiry"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub fn direction(&self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: SortKey,
}

impl Filters {
    /// Validate raw list parameters against `safelist`.
    ///
    /// Missing values take the defaults (page 1, 20 per page, sort by the
    /// first safelist entry).
    pub fn parse(
        page: Option<i64>,
        page_size: Option<i64>,
        sort: Option<&str>,
        safelist: &'static [&'static str],
    ) -> Result<Self, ValidationErrors> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut v = ValidationErrors::new();
        v.check(page > 0, "page", "must be greater than zero");
        v.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(page_size > 0, "page_size", "must be greater than zero");
        v.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

        let requested = sort.unwrap_or_else(|| safelist.first().copied().unwrap_or("id"));
        let matched = safelist.iter().copied().find(|entry| *entry == requested);
        v.check(matched.is_some(), "sort", "invalid sort value");
        v.into_result()?;

        let entry = matched.unwrap_or("id");
        let sort = match entry.strip_prefix('-') {
            Some(column) => SortKey {
                column,
                descending: true,
            },
            None => SortKey {
                column: entry,
                descending: false,
            },
        };
        Ok(Self {
            page,
            page_size,
            sort,
        })
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortKey {
                column: "id",
                descending: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 {
            return Self {
                current_page: page,
                page_size,
                ..Self::default()
            };
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// One window of a list plus the metadata describing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub metadata: Metadata,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_records: i64, filters: &Filters) -> Self {
        Self {
            items,
            metadata: Metadata::calculate(total_records, filters.page, filters.page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let filters = Filters::parse(None, None, None, ACCOUNT_SORT_SAFELIST).expect("filters");
        assert_eq!(filters, Filters::default());
        assert_eq!(filters.offset(), 0);
        assert_eq!(filters.limit(), 20);
    }

    #[test]
    fn descending_prefix_is_split_off() {
        let filters =
            Filters::parse(Some(3), Some(10), Some("-expiry"), CARD_SORT_SAFELIST).expect("ok");
        assert_eq!(filters.sort.column, "expiry");
        assert!(filters.sort.descending);
        assert_eq!(filters.sort.direction(), "DESC");
        assert_eq!(filters.offset(), 20);
    }

    #[test]
    fn out_of_range_and_unknown_sort_are_reported_per_field() {
        let err = Filters::parse(
            Some(0),
            Some(101),
            Some("password_hash"),
            ACCOUNT_SORT_SAFELIST,
        )
        .unwrap_err();
        assert_eq!(err.get("page"), Some("must be greater than zero"));
        assert_eq!(err.get("page_size"), Some("must be a maximum of 100"));
        assert_eq!(err.get("sort"), Some("invalid sort value"));

        let err = Filters::parse(Some(10_000_001), None, None, CARD_SORT_SAFELIST).unwrap_err();
        assert_eq!(err.get("page"), Some("must be a maximum of 10 million"));
    }

    #[test]
    fn card_sort_rejects_account_columns() {
        assert!(Filters::parse(None, None, Some("frozen"), CARD_SORT_SAFELIST).is_err());
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let meta = Metadata::calculate(45, 2, 20);
        assert_eq!(
            meta,
            Metadata {
                current_page: 2,
                page_size: 20,
                first_page: 1,
                last_page: 3,
                total_records: 45,
            }
        );
        assert_eq!(Metadata::calculate(40, 1, 20).last_page, 2);
    }

    #[test]
    fn empty_metadata_echoes_request() {
        assert_eq!(
            Metadata::calculate(0, 1, 20),
            Metadata {
                current_page: 1,
                page_size: 20,
                first_page: 0,
                last_page: 0,
                total_records: 0,
            }
        );
    }
}
