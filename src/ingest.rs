use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use tracing::{debug, error, info, warn};

use crate::db::{Category, Store};
use crate::error::{ParseError, Phase, PipelineError, StoreError};
use crate::fetch::{Fetch, Page};
use crate::parser::{extract_books, extract_categories, extract_next_page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Categories,
    Books,
    Completed,
    Failed,
}

/// Counters for one run. Book counts only include committed categories.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub categories_found: usize,
    pub categories_created: usize,
    pub categories_crawled: usize,
    pub pages_fetched: usize,
    pub books_created: usize,
    pub books_updated: usize,
}

impl RunReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            categories_found: 0,
            categories_created: 0,
            categories_crawled: 0,
            pages_fetched: 0,
            books_created: 0,
            books_updated: 0,
        }
    }

    pub fn print(&self) {
        let finished = self.finished_at.unwrap_or_else(Utc::now);
        println!(
            "Run {} -> {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            finished.format("%H:%M:%S")
        );
        println!(
            "Categories: {} found, {} new. Crawled {} categories ({} pages).",
            self.categories_found, self.categories_created, self.categories_crawled, self.pages_fetched,
        );
        println!(
            "Books: {} added, {} updated.",
            self.books_created, self.books_updated
        );
    }
}

/// Two-phase crawl: categories from the root page first, then the books of
/// every stored category. Strictly sequential; one request in flight.
pub struct Ingestion<'a, F> {
    store: &'a Store,
    fetcher: &'a F,
    root: Url,
    state: RunState,
    report: RunReport,
}

impl<'a, F: Fetch> Ingestion<'a, F> {
    pub fn new(store: &'a Store, fetcher: &'a F, root: Url) -> Self {
        Self {
            store,
            fetcher,
            root,
            state: RunState::NotStarted,
            report: RunReport::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counters so far; after a failure these describe what was committed.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        let result = self.run_phases().await;
        self.report.finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                self.state = RunState::Completed;
                info!(
                    "Ingestion completed: {} books added, {} updated across {} categories",
                    self.report.books_created, self.report.books_updated, self.report.categories_crawled
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                self.state = RunState::Failed;
                error!("Ingestion failed in {} phase ({}): {}", e.phase(), e.kind(), e);
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<(), PipelineError> {
        self.state = RunState::Categories;
        self.sync_categories().await?;

        self.state = RunState::Books;
        self.sync_books().await
    }

    async fn sync_categories(&mut self) -> Result<(), PipelineError> {
        let phase = Phase::Categories;
        info!("Phase 1: fetching categories from {}", self.root);

        let root = self.root.clone();
        let page = self.fetch(phase, &root).await?;
        let links = extract_categories(&page.body, &page.url).map_err(|source| {
            PipelineError::Parse {
                phase,
                url: page.url.to_string(),
                source,
            }
        })?;
        self.report.categories_found = links.len();

        let store_err = |source| PipelineError::Store {
            phase,
            url: page.url.to_string(),
            source,
        };
        let store = self.store;
        let batch = store.batch().map_err(store_err)?;
        let mut created = 0;
        for link in &links {
            let (category, is_new) = batch
                .find_or_create_category(&link.name, link.url.as_str())
                .map_err(store_err)?;
            if is_new {
                debug!("New category {:?} (id {})", category.name, category.id);
                created += 1;
            }
        }
        batch.commit().map_err(store_err)?;
        self.report.categories_created = created;

        info!("{} categories saved/verified ({} new)", links.len(), created);
        Ok(())
    }

    async fn sync_books(&mut self) -> Result<(), PipelineError> {
        let categories = self
            .store
            .list_categories()
            .map_err(|source| PipelineError::Store {
                phase: Phase::Books,
                url: self.root.to_string(),
                source,
            })?;
        info!("Phase 2: crawling books for {} categories", categories.len());

        let pb = ProgressBar::new(categories.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        for category in &categories {
            pb.set_message(category.name.clone());
            if let Err(e) = self.crawl_category(category).await {
                pb.abandon();
                return Err(e);
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(())
    }

    /// All listing pages of one category, committed as a single batch.
    async fn crawl_category(&mut self, category: &Category) -> Result<(), PipelineError> {
        let phase = Phase::Books;
        let start = Url::parse(&category.url).map_err(|e| PipelineError::Parse {
            phase,
            url: category.url.clone(),
            source: ParseError::InvalidUrl {
                href: category.url.clone(),
                reason: e.to_string(),
            },
        })?;

        let store_err = |url: &Url, source: StoreError| PipelineError::Store {
            phase,
            url: url.to_string(),
            source,
        };
        let store = self.store;
        let batch = store.batch().map_err(|e| store_err(&start, e))?;

        let mut created = 0;
        let mut updated = 0;
        let mut seen = HashSet::new();
        let mut next = Some(start);

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                warn!("Pagination of {:?} loops back to {}, stopping", category.name, url);
                break;
            }

            let page = self.fetch(phase, &url).await?;
            let parse_err = |source| PipelineError::Parse {
                phase,
                url: page.url.to_string(),
                source,
            };
            let books = extract_books(&page.body, &page.url).map_err(parse_err)?;

            for book in &books {
                let (_, is_new) = batch
                    .upsert_book(
                        &book.title,
                        book.price,
                        book.rating,
                        book.image_url.as_str(),
                        category.id,
                    )
                    .map_err(|e| store_err(&page.url, e))?;
                if is_new {
                    created += 1;
                } else {
                    updated += 1;
                }
            }

            next = extract_next_page(&page.body, &page.url).map_err(parse_err)?;
        }

        let pages = seen.len();
        batch.commit().map_err(|e| PipelineError::Store {
            phase,
            url: category.url.clone(),
            source: e,
        })?;

        self.report.categories_crawled += 1;
        self.report.books_created += created;
        self.report.books_updated += updated;
        info!(
            "{}: {} books added, {} updated ({} pages)",
            category.name, created, updated, pages
        );
        Ok(())
    }

    async fn fetch(&mut self, phase: Phase, url: &Url) -> Result<Page, PipelineError> {
        let page = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| PipelineError::Fetch {
                phase,
                url: url.to_string(),
                source,
            })?;
        self.report.pages_fetched += 1;
        debug!("Fetched {} (HTTP {})", page.url, page.status);
        Ok(page)
    }
}
