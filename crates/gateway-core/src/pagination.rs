// ABOUTME: Page/size pagination for list endpoints
// ABOUTME: Normalizes query parameters and carries total counts for paginated envelopes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::{Deserialize, Serialize};

use crate::constants::pagination::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Raw `?page=&size=` query parameters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageParams {
    /// 1-based page number
    pub page: Option<u32>,
    /// Items per page
    pub size: Option<u32>,
}

/// Validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub size: u32,
}

impl PageParams {
    /// Clamp to sane bounds: page >= 1, size within `1..=MAX_PAGE_SIZE`
    #[must_use]
    pub fn normalize(self) -> Page {
        let page = self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let size = self
            .size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Page { page, size }
    }
}

impl Page {
    /// SQL `LIMIT`
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    /// SQL `OFFSET`
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }
}

/// One page of items together with the total row count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Total matching rows
    pub total: i64,
    /// Page number served
    pub page: u32,
    /// Page size served
    pub size: u32,
}

impl<T> Paginated<T> {
    /// Build from a page window
    #[must_use]
    pub const fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            size: page.size,
        }
    }
}
