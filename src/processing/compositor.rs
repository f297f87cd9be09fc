// src/processing/compositor.rs
//! Index compositor
//!
//! Evaluates every catalog definition, then every user definition, against
//! one image and merges the derived bands onto it in a single batch. This is
//! the only place per-index failures are swallowed: each one is logged and
//! kept in the [`Composition`] outcome list.

use tracing::{debug, warn};

use super::evaluator::evaluate_band;
use crate::catalog::{IndexCatalog, IndexDefinition};
use crate::error::IndexError;
use crate::raster::Image;

/// What happened to one definition during a compose pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOutcome {
    pub name: String,
    pub result: Result<(), IndexError>,
}

impl IndexOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub image: Image,
    /// One entry per evaluated definition, in evaluation order.
    pub outcomes: Vec<IndexOutcome>,
}

impl Composition {
    pub fn failures(&self) -> impl Iterator<Item = &IndexError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn computed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.name.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexCompositor<'a> {
    catalog: &'a IndexCatalog,
}

impl Default for IndexCompositor<'static> {
    fn default() -> Self {
        Self::new(IndexCatalog::builtin())
    }
}

impl<'a> IndexCompositor<'a> {
    pub fn new(catalog: &'a IndexCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a IndexCatalog {
        self.catalog
    }

    /// Image with every computable index band merged on. Never fails.
    pub fn compose(&self, image: &Image, user_definitions: &[IndexDefinition]) -> Image {
        self.compose_with_report(image, user_definitions).image
    }

    pub fn compose_with_report(
        &self,
        image: &Image,
        user_definitions: &[IndexDefinition],
    ) -> Composition {
        let definitions = self.catalog.all().iter().chain(user_definitions);

        let mut staged = Vec::new();
        let mut outcomes = Vec::new();
        for def in definitions {
            let result = match evaluate_band(image, def) {
                Ok(band) => {
                    staged.push(band);
                    Ok(())
                }
                Err(err) => {
                    warn!(index = %def.name, kind = err.kind(), "skipping index: {err}");
                    Err(err)
                }
            };
            outcomes.push(IndexOutcome {
                name: def.name.clone(),
                result,
            });
        }

        debug!(
            image = image.id(),
            computed = staged.len(),
            skipped = outcomes.len() - staged.len(),
            "composed index bands"
        );

        Composition {
            image: image.with_derived(staged),
            outcomes,
        }
    }
}
