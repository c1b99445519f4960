use teledex_core::assembler::MediaFetcher;
use teledex_core::catalog::CatalogService;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Link resolution pipeline.
    pub fetcher: MediaFetcher,
    /// Catalog workflows.
    pub catalog: CatalogService,
}

impl AppState {
    /// Bundle the fetcher and the catalog.
    #[must_use]
    pub const fn new(fetcher: MediaFetcher, catalog: CatalogService) -> Self {
        Self { fetcher, catalog }
    }
}
