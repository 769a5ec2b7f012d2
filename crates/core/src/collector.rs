use crate::assembler::DocumentAssembler;
use crate::config::{CollectorOptions, DataPaths};
use crate::error::{IngestError, RegistryError};
use crate::models::Document;
use crate::progress::{PageJournal, ProgressStore};
use crate::registry::{RegistryClient, RegistryQuery, RegistryResponse};
use crate::traits::LiveSource;
use std::collections::HashSet;
use std::thread;
use tracing::{info, warn};

pub const LIVE_SEARCH_ROWS: u32 = 3;

enum PageOutcome {
    Collected(Vec<Document>),
    Exhausted,
    Rejected { code: String, message: String },
}

/// Resumable bulk collection of the registry into a corpus.
pub struct Collector<R> {
    registry: R,
    assembler: DocumentAssembler,
    options: CollectorOptions,
    progress: ProgressStore,
    journal: PageJournal,
}

impl<R: RegistryClient> Collector<R> {
    pub fn new(
        registry: R,
        assembler: DocumentAssembler,
        options: CollectorOptions,
        paths: &DataPaths,
    ) -> Self {
        Self {
            registry,
            assembler,
            options,
            progress: ProgressStore::new(paths.progress_path()),
            journal: PageJournal::new(paths.journal_path()),
        }
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    /// Forgets all committed pages so the next `collect` starts at page 1.
    pub fn reset(&self) -> Result<(), IngestError> {
        self.journal.clear()?;
        self.progress.clear()
    }

    pub fn collect(&self) -> Result<Vec<Document>, IngestError> {
        if self.options.page_size == 0 {
            return Err(IngestError::InvalidArgument(
                "page size must be positive".to_string(),
            ));
        }

        let mut progress = self.progress.load();
        let mut documents = self.journal.replay(progress.last_page)?;
        let target = self.options.target_documents;

        if progress.last_page > 0 {
            info!(
                last_page = progress.last_page,
                documents = documents.len(),
                "resuming collection"
            );
        }

        let mut page = progress.last_page.saturating_add(1);
        while page <= self.options.max_pages && documents.len() < target {
            match self.collect_page(page) {
                Ok(PageOutcome::Exhausted) => {
                    info!(page, "registry has no more items");
                    break;
                }
                Ok(PageOutcome::Rejected { code, message }) => {
                    warn!(page, %code, %message, "registry rejected page request");
                    break;
                }
                Ok(PageOutcome::Collected(page_documents)) => {
                    self.journal.append(page, &page_documents)?;
                    documents.extend(page_documents);

                    progress.last_page = page;
                    progress.total_documents = documents.len();
                    self.progress.save(&mut progress)?;
                    info!(page, total = documents.len(), "page committed");

                    if documents.len() >= target {
                        info!(
                            total = documents.len(),
                            target_documents = target,
                            "target document count reached"
                        );
                        break;
                    }

                    page += 1;
                    self.pause();
                }
                Err(error) => {
                    // progress.last_page still names the last committed page
                    warn!(page, %error, "page failed, moving on");
                    progress.total_documents = documents.len();
                    self.progress.save(&mut progress)?;

                    page += 1;
                    self.pause();
                }
            }
        }

        let collected = documents.len();
        let corpus = dedup_corpus(documents);
        info!(
            collected,
            unique = corpus.len(),
            "collection finished"
        );
        Ok(corpus)
    }

    fn collect_page(&self, page: u32) -> Result<PageOutcome, RegistryError> {
        let response = self.registry.fetch(&RegistryQuery::Page {
            page_no: page,
            page_size: self.options.page_size,
        })?;

        let items = match response {
            RegistryResponse::Rejected { code, message } => {
                return Ok(PageOutcome::Rejected { code, message })
            }
            RegistryResponse::Items(items) => items,
        };

        if items.is_empty() {
            return Ok(PageOutcome::Exhausted);
        }

        Ok(PageOutcome::Collected(
            self.assembler.assemble_all(&items, None),
        ))
    }

    fn pause(&self) {
        if !self.options.page_delay.is_zero() {
            thread::sleep(self.options.page_delay);
        }
    }
}

/// Keeps the first document for each (product, category, company) key.
pub fn dedup_corpus(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|document| seen.insert(document.dedup_key()))
        .collect()
}

/// Live registry search by product name, then by efficacy text.
pub struct LiveRegistrySearch<R> {
    registry: R,
    assembler: DocumentAssembler,
    rows: u32,
}

impl<R: RegistryClient> LiveRegistrySearch<R> {
    pub fn new(registry: R, assembler: DocumentAssembler) -> Self {
        Self {
            registry,
            assembler,
            rows: LIVE_SEARCH_ROWS,
        }
    }

    pub fn with_rows(mut self, rows: u32) -> Self {
        self.rows = rows;
        self
    }
}

impl<R: RegistryClient> LiveSource for LiveRegistrySearch<R> {
    fn search_live(&self, query: &str) -> Result<Vec<Document>, RegistryError> {
        let attempts = [
            (
                "item name",
                RegistryQuery::ItemName {
                    term: query,
                    rows: self.rows,
                },
            ),
            (
                "efficacy",
                RegistryQuery::Efficacy {
                    term: query,
                    rows: self.rows,
                },
            ),
        ];

        let mut documents = Vec::new();
        let mut answered = 0usize;
        let mut last_error = None;

        for (label, registry_query) in attempts {
            match self.registry.fetch(&registry_query) {
                Ok(response) => {
                    answered += 1;
                    let found = self
                        .assembler
                        .assemble_all(&response.into_items(), Some(query));
                    if !found.is_empty() {
                        info!(search = label, documents = found.len(), "live registry hits");
                    }
                    documents.extend(found);
                }
                Err(error) => {
                    warn!(search = label, %error, "live registry search failed");
                    last_error = Some(error);
                }
            }
        }

        if answered == 0 {
            if let Some(error) = last_error {
                return Err(error);
            }
        }

        let mut seen = HashSet::new();
        Ok(documents
            .into_iter()
            .filter(|document| {
                seen.insert((document.product_name.clone(), document.category.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::progress::{IngestionProgress, PageJournal, ProgressStore};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Clone)]
    enum FakePage {
        Items(Vec<RawRecord>),
        Fail,
        Rejected,
    }

    #[derive(Default)]
    struct FakeRegistry {
        pages: HashMap<u32, FakePage>,
        default_page: Option<FakePage>,
        fetched: RefCell<Vec<u32>>,
        item_name: Option<FakePage>,
        efficacy: Option<FakePage>,
    }

    impl FakeRegistry {
        fn respond(page: Option<FakePage>) -> Result<RegistryResponse, RegistryError> {
            match page {
                Some(FakePage::Items(items)) => Ok(RegistryResponse::Items(items)),
                Some(FakePage::Fail) => Err(RegistryError::Status(503)),
                Some(FakePage::Rejected) => Ok(RegistryResponse::Rejected {
                    code: "22".to_string(),
                    message: "LIMITED NUMBER OF SERVICE REQUESTS EXCEEDS".to_string(),
                }),
                None => Ok(RegistryResponse::Items(Vec::new())),
            }
        }
    }

    impl RegistryClient for FakeRegistry {
        fn fetch(&self, query: &RegistryQuery<'_>) -> Result<RegistryResponse, RegistryError> {
            match query {
                RegistryQuery::Page { page_no, .. } => {
                    self.fetched.borrow_mut().push(*page_no);
                    let page = self
                        .pages
                        .get(page_no)
                        .cloned()
                        .or_else(|| self.default_page.clone());
                    Self::respond(page)
                }
                RegistryQuery::ItemName { .. } => Self::respond(self.item_name.clone()),
                RegistryQuery::Efficacy { .. } => Self::respond(self.efficacy.clone()),
            }
        }
    }

    fn record(name: &str, company: &str) -> RawRecord {
        RawRecord {
            item_name: Some(name.to_string()),
            company_name: Some(company.to_string()),
            efficacy: Some("두통 완화에 사용합니다".to_string()),
            ..Default::default()
        }
    }

    fn options(target: usize, max_pages: u32) -> CollectorOptions {
        CollectorOptions {
            page_size: 100,
            target_documents: target,
            max_pages,
            page_delay: Duration::ZERO,
        }
    }

    fn collector<'a>(
        registry: &'a FakeRegistry,
        options: CollectorOptions,
        paths: &DataPaths,
    ) -> Collector<&'a FakeRegistry> {
        let assembler = DocumentAssembler::new().expect("default extractor");
        Collector::new(registry, assembler, options, paths)
    }

    #[test]
    fn collects_until_exhausted_and_dedups_across_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            pages: HashMap::from([
                (1, FakePage::Items(vec![record("A정", "회사1"), record("B정", "회사1")])),
                (2, FakePage::Items(vec![record("A정", "회사1"), record("A정", "회사2")])),
            ]),
            ..Default::default()
        };

        let corpus = collector(&registry, options(1_000, 100), &paths).collect()?;

        let keys = corpus
            .iter()
            .map(|doc| (doc.product_name.as_str(), doc.company_name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![("A정", "회사1"), ("B정", "회사1"), ("A정", "회사2")]);
        assert_eq!(*registry.fetched.borrow(), vec![1, 2, 3]);

        let progress = ProgressStore::new(paths.progress_path()).load();
        assert_eq!(progress.last_page, 2);
        assert_eq!(progress.total_documents, 4);
        Ok(())
    }

    #[test]
    fn resumes_after_last_committed_page() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let assembler = DocumentAssembler::new()?;

        let earlier = assembler.assemble_all(&[record("Old정", "회사")], None);
        PageJournal::new(paths.journal_path()).append(2, &earlier)?;
        ProgressStore::new(paths.progress_path()).save(&mut IngestionProgress {
            last_page: 2,
            total_documents: 1,
            last_update: None,
        })?;

        let registry = FakeRegistry {
            pages: HashMap::from([(3, FakePage::Items(vec![record("New정", "회사")]))]),
            ..Default::default()
        };

        let corpus = collector(&registry, options(1_000, 100), &paths).collect()?;

        assert_eq!(registry.fetched.borrow()[0], 3);
        let names = corpus
            .iter()
            .map(|doc| doc.product_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Old정", "New정"]);
        Ok(())
    }

    #[test]
    fn resumes_past_a_journal_line_torn_inside_hangul() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let assembler = DocumentAssembler::new()?;
        let journal = PageJournal::new(paths.journal_path());

        journal.append(1, &assembler.assemble_all(&[record("게보린정", "회사")], None))?;
        ProgressStore::new(paths.progress_path()).save(&mut IngestionProgress {
            last_page: 1,
            total_documents: 1,
            last_update: None,
        })?;
        let committed = std::fs::metadata(paths.journal_path())?.len();
        journal.append(2, &assembler.assemble_all(&[record("타이레놀정", "회사")], None))?;
        let raw = std::fs::read(paths.journal_path())?;
        let torn_at = raw[committed as usize..]
            .windows("타".len())
            .position(|window| window == "타".as_bytes())
            .ok_or("page 2 line has no hangul")?;
        std::fs::OpenOptions::new()
            .write(true)
            .open(paths.journal_path())?
            .set_len(committed + torn_at as u64 + 1)?;

        let registry = FakeRegistry {
            pages: HashMap::from([(2, FakePage::Items(vec![record("타이레놀정", "회사")]))]),
            ..Default::default()
        };
        let corpus = collector(&registry, options(1_000, 100), &paths).collect()?;

        let names = corpus
            .iter()
            .map(|doc| doc.product_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["게보린정", "타이레놀정"]);
        assert_eq!(registry.fetched.borrow()[0], 2);
        assert_eq!(journal.replay(2)?.len(), 2);
        Ok(())
    }

    #[test]
    fn recollected_page_is_counted_once() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let assembler = DocumentAssembler::new()?;
        let journal = PageJournal::new(paths.journal_path());

        journal.append(1, &assembler.assemble_all(&[record("A정", "회사")], None))?;
        ProgressStore::new(paths.progress_path()).save(&mut IngestionProgress {
            last_page: 1,
            total_documents: 1,
            last_update: None,
        })?;
        // journaled, but the checkpoint never caught up
        journal.append(2, &assembler.assemble_all(&[record("B정", "회사")], None))?;

        let registry = FakeRegistry {
            pages: HashMap::from([(2, FakePage::Items(vec![record("B정", "회사")]))]),
            ..Default::default()
        };
        collector(&registry, options(1_000, 100), &paths).collect()?;

        assert_eq!(ProgressStore::new(paths.progress_path()).load().total_documents, 2);
        assert_eq!(journal.replay(2)?.len(), 2);
        Ok(())
    }

    #[test]
    fn failed_page_is_skipped_without_being_committed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            pages: HashMap::from([
                (1, FakePage::Items(vec![record("A정", "회사")])),
                (2, FakePage::Fail),
                (3, FakePage::Fail),
            ]),
            ..Default::default()
        };

        let corpus = collector(&registry, options(1_000, 100), &paths).collect()?;

        assert_eq!(corpus.len(), 1);
        assert_eq!(*registry.fetched.borrow(), vec![1, 2, 3, 4]);
        assert_eq!(ProgressStore::new(paths.progress_path()).load().last_page, 1);
        Ok(())
    }

    #[test]
    fn stops_once_target_is_reached() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            default_page: Some(FakePage::Items(vec![record("A정", "회사"), record("B정", "회사")])),
            ..Default::default()
        };

        collector(&registry, options(2, 100), &paths).collect()?;
        assert_eq!(*registry.fetched.borrow(), vec![1]);
        Ok(())
    }

    #[test]
    fn stops_at_max_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            default_page: Some(FakePage::Items(vec![record("A정", "회사")])),
            ..Default::default()
        };

        let corpus = collector(&registry, options(1_000, 2), &paths).collect()?;
        assert_eq!(*registry.fetched.borrow(), vec![1, 2]);
        assert_eq!(corpus.len(), 1);
        Ok(())
    }

    #[test]
    fn rejected_result_code_ends_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            pages: HashMap::from([
                (1, FakePage::Items(vec![record("A정", "회사")])),
                (2, FakePage::Rejected),
            ]),
            default_page: Some(FakePage::Items(vec![record("Z정", "회사")])),
            ..Default::default()
        };

        let corpus = collector(&registry, options(1_000, 100), &paths).collect()?;
        assert_eq!(corpus.len(), 1);
        assert_eq!(*registry.fetched.borrow(), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn reset_clears_checkpoint_and_journal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let paths = DataPaths::new(dir.path());
        let registry = FakeRegistry {
            pages: HashMap::from([(1, FakePage::Items(vec![record("A정", "회사")]))]),
            ..Default::default()
        };

        let collector = collector(&registry, options(1_000, 100), &paths);
        collector.collect()?;
        collector.reset()?;

        assert!(!paths.progress_path().exists());
        assert!(!paths.journal_path().exists());
        Ok(())
    }

    #[test]
    fn live_search_survives_one_failing_sub_search() -> Result<(), Box<dyn std::error::Error>> {
        let registry = FakeRegistry {
            item_name: Some(FakePage::Fail),
            efficacy: Some(FakePage::Items(vec![
                record("게보린정", "삼진제약"),
                record("게보린정", "다른회사"),
            ])),
            ..Default::default()
        };

        let live = LiveRegistrySearch::new(&registry, DocumentAssembler::new()?);
        let documents = live.search_live("두통")?;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].drug_name, "두통");
        assert_eq!(documents[0].product_name, "게보린정");
        Ok(())
    }

    #[test]
    fn live_search_errors_only_when_every_sub_search_fails() -> Result<(), Box<dyn std::error::Error>> {
        let registry = FakeRegistry {
            item_name: Some(FakePage::Fail),
            efficacy: Some(FakePage::Fail),
            ..Default::default()
        };

        let live = LiveRegistrySearch::new(&registry, DocumentAssembler::new()?);
        assert!(matches!(
            live.search_live("두통"),
            Err(RegistryError::Status(503))
        ));
        Ok(())
    }
}
