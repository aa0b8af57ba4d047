use crate::catalog::CatalogSnapshot;

/// Read side of the product catalog. Only called at index build and reload.
pub trait CatalogStore: Send + Sync {
    fn list_all_products(&self) -> crate::error::Result<CatalogSnapshot>;
}
