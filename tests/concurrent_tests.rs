//! Concurrent render and compression tests.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use html2pdf_render::driver::mock::{MockBrowserLauncher, PrintBehavior, sample_pdf};
use html2pdf_render::prelude::*;
use tokio::task::JoinSet;

/// Renders in parallel each get their own browser and working directory,
/// and leave nothing behind.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_renders_are_isolated() {
    common::init_logging();
    let root = tempfile::tempdir().unwrap();
    let launcher = MockBrowserLauncher::new().print_delay(Duration::from_millis(20));
    let service = common::service(&launcher, root.path()).into_shared();

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .render(RenderRequest::from_html(format!("<p>document {}</p>", i)))
                .await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let pdf = result.expect("task should not panic").unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    assert_eq!(launcher.launch_count(), 8);
    assert_eq!(launcher.live_sessions(), 0);
    assert_eq!(common::leftovers(root.path()), 0);

    let profiles: HashSet<_> = launcher
        .launch_specs()
        .into_iter()
        .map(|spec| spec.profile_dir)
        .collect();
    assert_eq!(profiles.len(), 8, "sessions must not share a profile");
}

/// One failing render does not disturb the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_stay_local() {
    let root = tempfile::tempdir().unwrap();
    let good = MockBrowserLauncher::new();
    let bad = MockBrowserLauncher::new().print(PrintBehavior::Missing);
    let good_service = common::service(&good, root.path()).into_shared();
    let bad_service = common::service(&bad, root.path()).into_shared();

    let mut tasks = JoinSet::new();
    for i in 0..6 {
        let service = if i % 2 == 0 {
            Arc::clone(&good_service)
        } else {
            Arc::clone(&bad_service)
        };
        tasks.spawn(async move { (i, service.render(RenderRequest::from_html("<p>x</p>")).await) });
    }

    while let Some(result) = tasks.join_next().await {
        let (i, outcome) = result.unwrap();
        assert_eq!(outcome.is_ok(), i % 2 == 0, "task {i}");
    }

    assert_eq!(good.live_sessions() + bad.live_sessions(), 0);
    assert_eq!(common::leftovers(root.path()), 0);
}

/// Compression calls share nothing and can run side by side.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_compression() {
    let root = tempfile::tempdir().unwrap();
    let service = common::service(&MockBrowserLauncher::new(), root.path()).into_shared();
    let pdf = sample_pdf().unwrap();

    let mut tasks = JoinSet::new();
    for level in 0..=9u8 {
        let service = Arc::clone(&service);
        let pdf = pdf.clone();
        tasks.spawn(async move { service.compress(pdf, level).await });
    }

    while let Some(result) = tasks.join_next().await {
        let output = result.unwrap().unwrap();
        assert_eq!(
            lopdf::Document::load_mem(&output).unwrap().get_pages().len(),
            1
        );
    }
}

/// The job queue runs renders on its workers and keeps every result.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_job_queue_under_load() {
    let root = tempfile::tempdir().unwrap();
    let launcher = MockBrowserLauncher::new();
    let queue = JobQueue::start(
        common::service(&launcher, root.path()),
        &QueueConfigBuilder::new().workers(3).capacity(4).build().unwrap(),
    );

    let mut ids = Vec::new();
    for i in 0..10 {
        let request = RenderRequest::from_html(format!("<p>{}</p>", i));
        ids.push(queue.submit_render(request, Some(5)).await.unwrap());
    }

    for id in &ids {
        assert_eq!(queue.wait(*id).await, Some(JobState::Succeeded));
    }
    for id in ids {
        let pdf = queue.take_result(id).unwrap().unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    queue.shutdown().await;
    assert_eq!(launcher.live_sessions(), 0);
    assert_eq!(common::leftovers(root.path()), 0);
}
