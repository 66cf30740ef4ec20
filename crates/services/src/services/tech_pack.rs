//! Factory spec ("tech pack") generation actions.

use std::sync::Arc;

use db::models::{
    revision::Revision,
    tech_pack::{TechPackAsset, TechPackKind},
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::design_gateway::{DesignGateway, GatewayError, TechPackRequest};

#[derive(Debug, Error)]
pub enum TechPackError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("base views must be generated before {0}")]
    MissingBaseViews(TechPackKind),
    #[error("the product has no active revision to document")]
    NoActiveRevision,
}

/// What the user asked the tech pack to do, parsed from free text.
///
/// The parse is a closed token match so a new phrasing falls out as `None`
/// and gets an explanatory reply, never a silently wrong action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechPackAction {
    Single(TechPackKind),
    All,
}

impl TechPackAction {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        let has = |needle: &str| text.contains(needle);
        let has_word = |word: &str| {
            text.split_whitespace()
                .any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == word)
        };

        // specific sections win over the catch-all phrasing
        if has("close-up") || has("close up") || has("closeup") || has("detail shot") {
            return Some(Self::Single(TechPackKind::CloseUps));
        }
        if has("sketch") {
            return Some(Self::Single(TechPackKind::Sketches));
        }
        if has("component") || has("part breakdown") {
            return Some(Self::Single(TechPackKind::Components));
        }
        if has("base view") || has("all views") {
            return Some(Self::Single(TechPackKind::BaseViews));
        }
        if has_word("everything") || has_word("all") || has("full tech pack") {
            return Some(Self::All);
        }
        None
    }

    fn kinds(&self) -> Vec<TechPackKind> {
        match self {
            Self::Single(kind) => vec![*kind],
            // base views first so the dependent kinds find their prerequisite
            Self::All => vec![
                TechPackKind::BaseViews,
                TechPackKind::CloseUps,
                TechPackKind::Sketches,
                TechPackKind::Components,
            ],
        }
    }
}

pub struct TechPackService {
    pool: SqlitePool,
    gateway: Arc<dyn DesignGateway>,
}

impl TechPackService {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn DesignGateway>) -> Self {
        Self { pool, gateway }
    }

    /// Run a tech pack action against the product's active revision.
    /// Returns the asset sets generated, in execution order.
    pub async fn execute(
        &self,
        product_id: Uuid,
        action: TechPackAction,
    ) -> Result<Vec<TechPackAsset>, TechPackError> {
        let revision = Revision::find_active(&self.pool, product_id)
            .await?
            .ok_or(TechPackError::NoActiveRevision)?;

        let mut generated = Vec::new();
        for kind in action.kinds() {
            if kind != TechPackKind::BaseViews
                && !TechPackAsset::has_base_views(&self.pool, product_id).await?
            {
                return Err(TechPackError::MissingBaseViews(kind));
            }

            let result = self
                .gateway
                .generate_tech_pack(&TechPackRequest {
                    product_id,
                    kind,
                    front_view_url: revision.front_view_url.clone(),
                })
                .await?;

            let asset =
                TechPackAsset::create(&self.pool, product_id, kind, &result.image_urls).await?;

            info!(
                product_id = %product_id,
                kind = %kind,
                image_count = asset.urls().len(),
                "tech pack section generated"
            );
            generated.push(asset);
        }

        Ok(generated)
    }

    /// Latest asset set per section, for the UI and for responder context.
    pub async fn summary(&self, product_id: Uuid) -> Result<Vec<TechPackAsset>, TechPackError> {
        Ok(TechPackAsset::find_latest_all(&self.pool, product_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_section() {
        assert_eq!(
            TechPackAction::parse("generate the base views please"),
            Some(TechPackAction::Single(TechPackKind::BaseViews))
        );
        assert_eq!(
            TechPackAction::parse("I need close-ups of the stitching"),
            Some(TechPackAction::Single(TechPackKind::CloseUps))
        );
        assert_eq!(
            TechPackAction::parse("make technical sketches"),
            Some(TechPackAction::Single(TechPackKind::Sketches))
        );
        assert_eq!(
            TechPackAction::parse("show me the component breakdown"),
            Some(TechPackAction::Single(TechPackKind::Components))
        );
    }

    #[test]
    fn parses_all() {
        assert_eq!(
            TechPackAction::parse("generate all of it"),
            Some(TechPackAction::All)
        );
        assert_eq!(
            TechPackAction::parse("the full tech pack"),
            Some(TechPackAction::All)
        );
    }

    #[test]
    fn all_views_means_base_views_not_all() {
        assert_eq!(
            TechPackAction::parse("regenerate all views"),
            Some(TechPackAction::Single(TechPackKind::BaseViews))
        );
    }

    #[test]
    fn unrecognized_is_none() {
        assert_eq!(TechPackAction::parse("what a nice shoe"), None);
        // "all" must match as a word, not inside another word
        assert_eq!(TechPackAction::parse("make it smaller"), None);
    }

    #[test]
    fn all_runs_base_views_first() {
        assert_eq!(TechPackAction::All.kinds()[0], TechPackKind::BaseViews);
    }
}
