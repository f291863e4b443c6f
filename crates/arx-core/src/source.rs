//! Where recipes come from

use crate::error::Result;
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Name of the build recipe file inside a package directory
pub const RECIPE_FILE: &str = "PKGBUILD";

/// Trait for fetching a package's build recipe into a workspace
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Fetch the recipe for `package_name`.
    ///
    /// Returns `Ok(None)` when the package has no recipe to fetch. Any files
    /// written must stay inside `workspace`.
    async fn fetch(&self, package_name: &str, workspace: &Workspace) -> Result<Option<Vec<u8>>>;
}

/// Recipes held in memory, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    recipes: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a recipe
    pub fn with_recipe(mut self, package_name: impl Into<String>, recipe: impl Into<Vec<u8>>) -> Self {
        self.recipes.insert(package_name.into(), recipe.into());
        self
    }
}

#[async_trait]
impl RecipeSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, package_name: &str, workspace: &Workspace) -> Result<Option<Vec<u8>>> {
        let Some(recipe) = self.recipes.get(package_name) else {
            debug!("No recipe for {} in memory", package_name);
            return Ok(None);
        };

        let path = workspace.path().join(RECIPE_FILE);
        tokio::fs::write(&path, recipe).await?;
        Ok(Some(tokio::fs::read(&path).await?))
    }
}
