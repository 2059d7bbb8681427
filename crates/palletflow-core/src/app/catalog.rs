//! Catalog - 製品とロケーションのマスタ管理

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::{AppContext, require};
use crate::domain::product::check_expiry_days;
use crate::domain::{
    Location, LocationId, LocationKind, LogisticsError, LogisticsResult, Product, ProductId,
};

/// Product fields to change. `None` keeps the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub expiry_days: Option<u32>,
}

#[derive(Clone)]
pub struct Catalog {
    ctx: Arc<AppContext>,
}

impl Catalog {
    pub(crate) fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Creates a product. `expiry_days` defaults to the configured shelf life.
    #[tracing::instrument(skip(self))]
    pub async fn create_product(
        &self,
        name: &str,
        expiry_days: Option<u32>,
    ) -> LogisticsResult<Product> {
        let now = self.ctx.clock.now();
        let expiry_days = expiry_days.unwrap_or(self.ctx.settings.default_expiry_days);
        let product = Product::new(
            self.ctx.ids.generate_product_id(),
            name,
            self.ctx.codes.product_code(name.trim(), now),
            expiry_days,
        )?;
        self.ctx.store.insert_product(product.clone()).await?;
        tracing::info!(product = %product.id, qr = %product.qr_code, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> LogisticsResult<Product> {
        let mut product = require(self.ctx.store.get_product(id).await?, "product", id)?;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(LogisticsError::InvalidInput(
                    "product name must not be blank".into(),
                ));
            }
            product.name = name.to_string();
        }
        if let Some(days) = update.expiry_days {
            check_expiry_days(days)?;
            product.expiry_days = days;
        }
        self.ctx.store.update_product(product.clone()).await?;
        Ok(product)
    }

    /// Refused while any location still holds the product.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> LogisticsResult<()> {
        require(self.ctx.store.remove_product(id).await?, "product", id)?;
        tracing::info!(product = %id, "product deleted");
        Ok(())
    }

    pub async fn get_product(&self, id: ProductId) -> LogisticsResult<Product> {
        require(self.ctx.store.get_product(id).await?, "product", id)
    }

    pub async fn list_products(&self) -> LogisticsResult<Vec<Product>> {
        self.ctx.store.list_products().await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_location(
        &self,
        kind: LocationKind,
        name: &str,
        code: &str,
        capacity: Option<u32>,
    ) -> LogisticsResult<Location> {
        let location = Location::new(
            self.ctx.ids.generate_location_id(),
            kind,
            name,
            code,
            capacity,
        )?;
        self.ctx.store.insert_location(location.clone()).await?;
        tracing::info!(location = %location.id, kind = %kind, "location created");
        Ok(location)
    }

    /// Refused when the new capacity is below the current load.
    #[tracing::instrument(skip(self))]
    pub async fn update_capacity(
        &self,
        id: LocationId,
        capacity: Option<u32>,
    ) -> LogisticsResult<Location> {
        self.ctx.store.set_capacity(id, capacity).await
    }

    /// Refused while the location still holds inventory.
    #[tracing::instrument(skip(self))]
    pub async fn delete_location(&self, id: LocationId) -> LogisticsResult<()> {
        require(self.ctx.store.remove_location(id).await?, "location", id)?;
        tracing::info!(location = %id, "location deleted");
        Ok(())
    }

    pub async fn get_location(&self, id: LocationId) -> LogisticsResult<Location> {
        require(self.ctx.store.get_location(id).await?, "location", id)
    }

    pub async fn list_locations(&self) -> LogisticsResult<Vec<Location>> {
        self.ctx.store.list_locations().await
    }
}
