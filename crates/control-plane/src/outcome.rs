use serde::Serialize;

use crate::error::ResolveError;

/// Result of one resolver pass. A degraded pass carries an empty value
/// plus the error that caused it; `skipped` lists per-row failures that
/// did not abort the pass.
#[derive(Clone, Debug)]
pub struct Resolution<T> {
    value: T,
    degraded: Option<ResolveError>,
    skipped: Vec<ResolveError>,
}

impl<T> Resolution<T> {
    pub fn loaded(value: T) -> Self {
        Self {
            value,
            degraded: None,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<ResolveError>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn error(&self) -> Option<&ResolveError> {
        self.degraded.as_ref()
    }

    pub fn skipped(&self) -> &[ResolveError] {
        &self.skipped
    }

    pub(crate) fn into_parts(self) -> (T, Option<ResolveError>, Vec<ResolveError>) {
        (self.value, self.degraded, self.skipped)
    }
}

impl<T: Default> Resolution<T> {
    pub fn degraded(error: ResolveError) -> Self {
        Self {
            value: T::default(),
            degraded: Some(error),
            skipped: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CategoryStatus {
    Loaded { items: usize, skipped: Vec<String> },
    Degraded { error: String },
}

impl CategoryStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, CategoryStatus::Degraded { .. })
    }

    pub(crate) fn from_parts(
        items: usize,
        degraded: Option<&ResolveError>,
        skipped: &[ResolveError],
    ) -> Self {
        match degraded {
            Some(err) => CategoryStatus::Degraded {
                error: err.to_string(),
            },
            None => CategoryStatus::Loaded {
                items,
                skipped: skipped.iter().map(ToString::to_string).collect(),
            },
        }
    }
}
