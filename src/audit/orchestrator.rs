// src/audit/orchestrator.rs
// =============================================================================
// The audit orchestrator: runs every AuditTask through the checker on a
// bounded pool of concurrent workers and collects one AuditResult per task.
//
// How a run works:
// 1. Tasks already present in the checkpoint log are skipped
// 2. The rest is cut into batches (or one batch when batching is off)
// 3. Each batch is fanned out with buffer_unordered(workers); each task runs
//    in its own tokio task so a panic stays inside that task
// 4. A single collector loop appends results, writes the checkpoint and
//    bumps the progress counter, in completion order
// 5. The next batch starts only when the previous one is fully drained, so
//    at most one batch worth of response bodies is alive at any time
//
// Nothing in here returns an error: every failure becomes an AuditResult.
// =============================================================================

use super::checkpoint::Checkpoint;
use super::types::{AuditOptions, AuditResult, AuditTask, FormatQuality, KeywordHits, Reachability};
use crate::checker::{classify, ClassifierConfig, HttpConfig, VerificationClient};
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Random pause before each request in stealth mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StealthDelay {
    pub min: Duration,
    pub max: Duration,
}

impl Default for StealthDelay {
    fn default() -> Self {
        StealthDelay {
            min: Duration::from_millis(500),
            max: Duration::from_secs(3),
        }
    }
}

impl StealthDelay {
    fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Everything the orchestrator needs besides the tasks.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Concurrent workers
    pub workers: usize,
    /// Tasks per batch; None runs everything as one batch
    pub batch_size: Option<usize>,
    /// Per-task random delay; None disables stealth mode
    pub stealth: Option<StealthDelay>,
    pub http: HttpConfig,
    pub classifier: ClassifierConfig,
}

impl RunConfig {
    /// Defaults tuned for the given options: fewer workers in stealth mode
    /// or when whole documents are downloaded, more for HEAD-only checks.
    pub fn for_options(options: &AuditOptions) -> Self {
        RunConfig {
            workers: recommended_workers(options),
            batch_size: None,
            stealth: options.stealth_delay.then(StealthDelay::default),
            http: if options.needs_body() {
                HttpConfig::full_fetch()
            } else {
                HttpConfig::liveness()
            },
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Worker count policy.
pub fn recommended_workers(options: &AuditOptions) -> usize {
    if options.stealth_delay {
        2
    } else if options.needs_body() {
        4
    } else {
        10
    }
}

/// Progress after a finished task. `completed` never goes down and ends
/// equal to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// 0-100; an empty run counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct AuditRun {
    /// Results of the tasks processed by this run, in completion order
    pub results: Vec<AuditResult>,
    /// Tasks skipped because the checkpoint already held their result
    pub resumed: usize,
}

/// Runs audits. Cheap to clone; every clone shares the same settings.
#[derive(Debug, Clone)]
pub struct Auditor {
    config: Arc<RunConfig>,
    client: Arc<VerificationClient>,
}

impl Auditor {
    pub fn new(config: RunConfig) -> Self {
        let client = Arc::new(VerificationClient::new(config.http.clone()));
        Auditor {
            config: Arc::new(config),
            client,
        }
    }

    /// Audits every task and returns one result per task not already in
    /// `checkpoint`. `on_progress` is called after every finished task.
    pub async fn run<F>(&self, tasks: Vec<AuditTask>, mut checkpoint: Option<&mut Checkpoint>, mut on_progress: F) -> AuditRun
    where
        F: FnMut(Progress),
    {
        let total = tasks.len();
        let pending: Vec<AuditTask> = match checkpoint.as_deref() {
            Some(log) => tasks.into_iter().filter(|t| !log.contains(t)).collect(),
            None => tasks,
        };
        let resumed = total - pending.len();
        if resumed > 0 {
            tracing::info!("resuming: {} of {} task(s) already in the checkpoint", resumed, total);
        }

        let workers = self.config.workers.max(1);
        let batch_size = self.config.batch_size.filter(|n| *n > 0).unwrap_or(pending.len().max(1));
        tracing::info!(
            "auditing {} link(s) with {} worker(s), batches of {}",
            pending.len(),
            workers,
            batch_size
        );

        let mut results = Vec::with_capacity(pending.len());
        let mut completed = resumed;
        let mut pending = pending.into_iter();
        let mut batch_no = 0;

        loop {
            let batch: Vec<AuditTask> = pending.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batch_no += 1;
            tracing::debug!("batch {}: {} task(s)", batch_no, batch.len());

            let mut finished = stream::iter(batch)
                .map(|task| self.spawn_task(task))
                .buffer_unordered(workers);

            while let Some(result) = finished.next().await {
                let write_failed = match checkpoint.as_deref_mut() {
                    Some(log) => match log.append(&result) {
                        Ok(()) => false,
                        Err(e) => {
                            tracing::error!(
                                "checkpoint write to {} failed, continuing without it: {:#}",
                                log.path().display(),
                                e
                            );
                            true
                        }
                    },
                    None => false,
                };
                if write_failed {
                    checkpoint = None;
                }

                completed += 1;
                results.push(result);
                on_progress(Progress { completed, total });
            }
            // `finished` and the batch's tasks are dropped here
        }

        // Nothing left to run (empty input or fully resumed)
        if results.is_empty() {
            on_progress(Progress { completed, total });
        }

        AuditRun { results, resumed }
    }

    // Runs one task on the tokio pool
    async fn spawn_task(&self, task: AuditTask) -> AuditResult {
        let fallback = AuditResult::from_task(&task, 0, Reachability::UnknownFailure);
        let auditor = self.clone();
        run_isolated(async move { auditor.audit_one(task).await }, fallback).await
    }

    /// Verification (+ classification when requested) for a single task.
    pub async fn audit_one(&self, task: AuditTask) -> AuditResult {
        if let Some(stealth) = self.config.stealth {
            tokio::time::sleep(stealth.pick()).await;
        }

        if !task.options.needs_body() {
            let verification = self.client.check(&task.url).await;
            return AuditResult::from_task(&task, verification.http_status, verification.reachability);
        }

        let fetched = self.client.fetch(&task.url).await;
        let verification = fetched.verification;
        let mut result = AuditResult::from_task(&task, verification.http_status, verification.reachability);

        let Some(document) = fetched.document else {
            // Reachable but the body could not be read
            if verification.reachability.is_reachable() {
                if let Some(e) = &fetched.body_error {
                    tracing::debug!("no document for {}: {}", task.url, e);
                }
                result.format_quality = mask_format(&task.options, FormatQuality::ProcessingError);
            }
            return result;
        };

        if document.truncated {
            tracing::debug!("{} was cut off at {} bytes", task.url, document.body.len());
        }

        // PDF/HTML parsing is CPU work; keep it off the async workers
        let classifier = self.config.classifier.clone();
        let url = task.url.clone();
        let keywords = Arc::clone(&task.keywords);
        let search = task.options.enable_content_search;
        let classified = tokio::task::spawn_blocking(move || {
            classify(
                &document.body,
                document.content_type.as_deref(),
                &url,
                search,
                &keywords,
                &classifier,
            )
        })
        .await;

        match classified {
            Ok(classification) => {
                result.format_quality = mask_format(&task.options, classification.format);
                result.keyword_hits = classification.hits;
            }
            Err(e) => {
                tracing::warn!("classification of {} failed: {}", task.url, e);
                result.format_quality = mask_format(&task.options, FormatQuality::ProcessingError);
                if task.options.enable_content_search {
                    result.keyword_hits = KeywordHits::NotApplicable;
                }
            }
        }

        result
    }
}

// Runs `work` as its own tokio task. If it panics, `fallback` stands in
// for its result.
async fn run_isolated<F>(work: F, fallback: AuditResult) -> AuditResult
where
    F: Future<Output = AuditResult> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("worker for {} crashed: {}", fallback.url, e);
            fallback
        }
    }
}

// Content search alone still classifies, but the format is only reported
// when the format audit was asked for.
fn mask_format(options: &AuditOptions, format: FormatQuality) -> FormatQuality {
    if options.enable_format_audit {
        format
    } else {
        FormatQuality::NotRequested
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why tokio::spawn inside buffer_unordered?
//    - buffer_unordered alone polls every future on the collector's task;
//      a panic there would take the whole run down
//    - Spawned, a panic turns into a JoinError we convert to UnknownFailure
//
// 2. Why is the collector the only writer?
//    - results, the checkpoint file and the progress counter are touched
//      from one loop only, so they need no locks
//
// 3. Why batches?
//    - Each in-flight task may hold a full document body in fetch mode
//    - Draining a batch before starting the next bounds memory by
//      batch_size x body size instead of the number of links
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::tiny_pdf;
    use crate::workbook::{extract_tasks, Cell, CellValue, Sheet, Workbook};
    use std::collections::HashSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(options: &AuditOptions) -> RunConfig {
        let mut config = RunConfig::for_options(options);
        config.http.backoff_base = Duration::from_millis(10);
        config.http.max_retries = 1;
        config
    }

    fn tasks_for(urls: &[String], options: AuditOptions) -> Vec<AuditTask> {
        let mut sheet = Sheet::new("Sheet1");
        for (i, url) in urls.iter().enumerate() {
            sheet.insert(Cell::new(format!("A{}", i + 1), Some(CellValue::Text(url.clone()))));
        }
        extract_tasks(&Workbook { sheets: vec![sheet] }, &[], options)
    }

    async fn mixed_server() -> MockServer {
        let server = MockServer::start().await;
        for (route, status) in [("/ok", 200), ("/missing", 404), ("/private", 403), ("/down", 500)] {
            Mock::given(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        server
    }

    #[test]
    fn test_worker_policy() {
        let liveness = AuditOptions::default();
        let body = AuditOptions {
            enable_format_audit: true,
            ..AuditOptions::default()
        };
        let stealth = AuditOptions {
            stealth_delay: true,
            enable_content_search: true,
            ..AuditOptions::default()
        };
        assert_eq!(recommended_workers(&liveness), 10);
        assert_eq!(recommended_workers(&body), 4);
        assert_eq!(recommended_workers(&stealth), 2);

        assert!(RunConfig::for_options(&stealth).stealth.is_some());
        assert!(RunConfig::for_options(&liveness).stealth.is_none());
        assert!(RunConfig::for_options(&body).http.timeout > RunConfig::for_options(&liveness).http.timeout);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(Progress { completed: 0, total: 4 }.percent(), 0);
        assert_eq!(Progress { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(Progress { completed: 3, total: 3 }.percent(), 100);
        assert_eq!(Progress { completed: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn test_stealth_delay_range() {
        let delay = StealthDelay {
            min: Duration::from_millis(5),
            max: Duration::from_millis(10),
        };
        for _ in 0..50 {
            let d = delay.pick();
            assert!(d >= delay.min && d <= delay.max);
        }
        let fixed = StealthDelay {
            min: Duration::from_millis(5),
            max: Duration::from_millis(5),
        };
        assert_eq!(fixed.pick(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_crashed_worker_still_yields_a_result() {
        let task = tasks_for(&["https://example.org/a".to_string()], AuditOptions::default()).remove(0);
        let fallback = AuditResult::from_task(&task, 0, Reachability::UnknownFailure);

        let crashing = async {
            let nothing: Option<AuditResult> = None;
            nothing.expect("worker crashed")
        };
        let result = run_isolated(crashing, fallback).await;

        assert_eq!(result.reachability, Reachability::UnknownFailure);
        assert_eq!(result.http_status, 0);
        assert_eq!(result.key(), task.key());
        assert_eq!(result.format_quality, FormatQuality::NotRequested);
    }

    #[tokio::test]
    async fn test_every_task_gets_a_result() {
        let server = mixed_server().await;
        let mut urls: Vec<String> = ["/ok", "/missing", "/private", "/down", "/ok"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        urls.push("mailto:nobody@example.org".to_string());

        let options = AuditOptions::default();
        let tasks = tasks_for(&urls, options);
        let auditor = Auditor::new(fast_config(&options));

        let mut seen = Vec::new();
        let run = auditor.run(tasks.clone(), None, |p| seen.push(p)).await;

        assert_eq!(run.results.len(), tasks.len());
        assert_eq!(run.resumed, 0);

        let by_cell = |cell: &str| {
            run.results
                .iter()
                .find(|r| r.cell_reference == cell)
                .map(|r| r.reachability)
                .unwrap()
        };
        assert_eq!(by_cell("A1"), Reachability::Reachable);
        assert_eq!(by_cell("A2"), Reachability::NotFound);
        assert_eq!(by_cell("A3"), Reachability::Forbidden);
        assert_eq!(by_cell("A4"), Reachability::ServerError(500));
        assert_eq!(by_cell("A6"), Reachability::UnknownFailure);

        // Monotonic, one call per task, ends at 100%
        assert_eq!(seen.len(), tasks.len());
        assert!(seen.windows(2).all(|w| w[0].completed < w[1].completed));
        assert_eq!(seen.last().unwrap().percent(), 100);
    }

    #[tokio::test]
    async fn test_batches_and_stealth_still_complete() {
        let server = mixed_server().await;
        let urls: Vec<String> = (0..7).map(|_| format!("{}/ok", server.uri())).collect();

        let options = AuditOptions {
            stealth_delay: true,
            ..AuditOptions::default()
        };
        let mut config = fast_config(&options);
        config.batch_size = Some(3);
        config.stealth = Some(StealthDelay {
            min: Duration::from_millis(1),
            max: Duration::from_millis(20),
        });

        let run = Auditor::new(config).run(tasks_for(&urls, options), None, |_| {}).await;
        assert_eq!(run.results.len(), 7);
        assert!(run.results.iter().all(|r| r.is_ok()));

        let unique: HashSet<_> = run.results.iter().map(|r| r.key()).collect();
        assert_eq!(unique.len(), 7);
    }

    #[tokio::test]
    async fn test_empty_run_reports_complete() {
        let auditor = Auditor::new(RunConfig::for_options(&AuditOptions::default()));
        let mut last = None;
        let run = auditor.run(Vec::new(), None, |p| last = Some(p)).await;
        assert!(run.results.is_empty());
        assert_eq!(last.map(|p| p.percent()), Some(100));
    }

    #[tokio::test]
    async fn test_resume_skips_recorded_tasks() {
        let server = mixed_server().await;
        let urls: Vec<String> = (0..5).map(|_| format!("{}/ok", server.uri())).collect();
        let options = AuditOptions::default();
        let tasks = tasks_for(&urls, options);
        let auditor = Auditor::new(fast_config(&options));

        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("progress.csv");

        // First run gets "interrupted" after two tasks
        {
            let mut log = Checkpoint::open(&log_path).unwrap();
            let first = auditor.run(tasks[..2].to_vec(), Some(&mut log), |_| {}).await;
            assert_eq!(first.results.len(), 2);
        }

        let mut log = Checkpoint::open(&log_path).unwrap();
        assert_eq!(log.len(), 2);
        let previous: Vec<AuditResult> = log.previous().to_vec();

        let mut seen = Vec::new();
        let second = auditor.run(tasks.clone(), Some(&mut log), |p| seen.push(p)).await;
        assert_eq!(second.resumed, 2);
        assert_eq!(second.results.len(), 3);
        assert_eq!(seen.first().map(|p| p.completed), Some(3));
        assert_eq!(seen.last().map(|p| p.percent()), Some(100));

        let mut keys: HashSet<_> = previous.iter().map(|r| r.key()).collect();
        for result in &second.results {
            assert!(keys.insert(result.key()), "duplicate result for {}", result.cell_reference);
        }
        assert_eq!(keys.len(), tasks.len());

        // A third run has nothing left to do
        drop(log);
        let mut log = Checkpoint::open(&log_path).unwrap();
        assert_eq!(log.len(), 5);
        let third = auditor.run(tasks, Some(&mut log), |_| {}).await;
        assert!(third.results.is_empty());
        assert_eq!(third.resumed, 5);
    }

    #[tokio::test]
    async fn test_liveness_mode_never_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let options = AuditOptions::default();
        let tasks = tasks_for(&[format!("{}/doc.pdf", server.uri())], options);
        let run = Auditor::new(fast_config(&options)).run(tasks, None, |_| {}).await;

        assert_eq!(run.results[0].format_quality, FormatQuality::NotRequested);
        assert_eq!(run.results[0].keyword_hits, KeywordHits::NotRequested);
    }

    #[tokio::test]
    async fn test_search_only_hides_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>El contrato</p>", "text/html"))
            .mount(&server)
            .await;

        let options = AuditOptions {
            enable_content_search: true,
            ..AuditOptions::default()
        };
        let mut sheet = Sheet::new("Sheet1");
        sheet.insert(Cell::new("A1", Some(CellValue::Text(format!("{}/page", server.uri())))));
        let tasks = extract_tasks(&Workbook { sheets: vec![sheet] }, &["Contrato".to_string()], options);

        let run = Auditor::new(fast_config(&options)).run(tasks, None, |_| {}).await;
        assert_eq!(run.results[0].format_quality, FormatQuality::NotRequested);
        assert_eq!(run.results[0].keyword_hits, KeywordHits::Matches(vec!["contrato".into()]));
    }

    #[tokio::test]
    async fn test_end_to_end_three_sheets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(tiny_pdf(Some("Informe anual 2024")), "application/pdf"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut sheet1 = Sheet::new("Sheet1");
        sheet1.insert(
            Cell::new("A1", Some(CellValue::Text("Informe".into())))
                .with_hyperlink(format!("{}/report.pdf", server.uri())),
        );
        let mut sheet2 = Sheet::new("Sheet2");
        sheet2.insert(Cell::new("B2", Some(CellValue::Text(format!("{}/missing", server.uri())))));
        let mut sheet3 = Sheet::new("Sheet3");
        sheet3.insert(Cell::new("C3", Some(CellValue::Text("N/A".into()))));
        let workbook = Workbook {
            sheets: vec![sheet1, sheet2, sheet3],
        };

        let options = AuditOptions {
            enable_format_audit: true,
            enable_content_search: true,
            stealth_delay: false,
        };
        let tasks = extract_tasks(&workbook, &["contrato".to_string()], options);
        assert_eq!(tasks.len(), 2);

        let run = Auditor::new(fast_config(&options)).run(tasks, None, |_| {}).await;
        assert_eq!(run.results.len(), 2);

        let pdf = run.results.iter().find(|r| r.sheet_name == "Sheet1").unwrap();
        assert_eq!(pdf.reachability, Reachability::Reachable);
        assert_eq!(pdf.http_status, 200);
        assert_eq!(pdf.format_quality, FormatQuality::ReadablePdf);
        assert_eq!(pdf.keyword_hits, KeywordHits::Matches(vec![]));

        let missing = run.results.iter().find(|r| r.sheet_name == "Sheet2").unwrap();
        assert_eq!(missing.reachability, Reachability::NotFound);
        assert_eq!(missing.http_status, 404);
        assert_eq!(missing.format_quality, FormatQuality::Unreachable);
    }
}
