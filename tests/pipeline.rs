use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use playlist_scribe::config::{HandoffMode, PipelineConfig};
use playlist_scribe::merge::MERGED_FILE_NAME;
use playlist_scribe::pipeline::ItemRef;
use playlist_scribe::sources::PlaylistListing;
use playlist_scribe::transcode::audio_path_for;
use playlist_scribe::{Fetcher, MetadataSource, Pipeline, ScribeError, Transcoder, Transcriber};

/// Listings keyed by reference; unknown references fail
#[derive(Default)]
struct FakeSource {
    listings: HashMap<String, (Option<String>, Vec<String>)>,
}

impl FakeSource {
    fn with(mut self, reference: &str, title: Option<&str>, items: &[&str]) -> Self {
        self.listings.insert(
            reference.to_string(),
            (title.map(str::to_string), items.iter().map(|s| s.to_string()).collect()),
        );
        self
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn list(&self, reference: &str) -> Result<PlaylistListing, ScribeError> {
        let (title, items) = self
            .listings
            .get(reference)
            .cloned()
            .ok_or_else(|| ScribeError::metadata(reference, "unknown playlist"))?;

        Ok(PlaylistListing {
            reference: reference.to_string(),
            title,
            items,
        })
    }
}

/// Writes `<reference>.mp4`; references starting with `fail-fetch` fail
struct FakeFetcher;

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, item: &ItemRef, destination: &Path) -> Result<PathBuf, ScribeError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if item.reference.starts_with("fail-fetch") {
            return Err(ScribeError::fetch(item.reference.as_str(), "HTTP 404"));
        }

        let path = destination.join(format!("{}.mp4", item.reference));
        tokio::fs::write(&path, format!("video {}", item.reference)).await?;
        Ok(path)
    }
}

/// Writes the mp3 next to the raw file; names starting with `bad-convert` fail
struct FakeTranscoder;

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn target_extension(&self) -> &str {
        "mp3"
    }

    async fn convert(&self, raw: &Path) -> Result<PathBuf, ScribeError> {
        let name = raw.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with("bad-convert") {
            return Err(ScribeError::conversion(raw, "invalid data found when processing input"));
        }

        let audio = audio_path_for(raw, "mp3");
        tokio::fs::copy(raw, &audio).await?;
        Ok(audio)
    }
}

/// Records how many transcriptions overlap; stems starting with `mute` fail
#[derive(Clone, Default)]
struct CountingTranscriber {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    fn name(&self) -> &str {
        "counting"
    }

    async fn transcribe(&mut self, audio: &Path) -> Result<String, ScribeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(10)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let stem = audio.file_stem().unwrap().to_string_lossy().into_owned();
        if stem.starts_with("mute") {
            return Err(ScribeError::transcription(audio, "no speech detected"));
        }
        Ok(format!("spoken words of {}", stem))
    }
}

fn settings(root: &Path) -> PipelineConfig {
    PipelineConfig {
        output_root: Some(root.to_path_buf()),
        download_concurrency: 4,
        conversion_concurrency: 2,
        metadata_concurrency: 3,
        handoff: HandoffMode::Memory,
    }
}

fn pipeline(settings: PipelineConfig, source: FakeSource, transcriber: CountingTranscriber) -> Pipeline<CountingTranscriber> {
    Pipeline::new(
        settings,
        Arc::new(source),
        Arc::new(FakeFetcher),
        Arc::new(FakeTranscoder),
        transcriber,
    )
}

fn file_names(folder: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(folder)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn refs(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn failed_fetch_skips_only_that_item() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default().with("pl", Some("Talks"), &["a1", "fail-fetch-a2", "a3"]);

    let summary = pipeline(settings(root.path()), source, CountingTranscriber::default())
        .run(&refs(&["pl"]))
        .await
        .unwrap();

    let playlist = &summary.playlists[0];
    assert_eq!(playlist.items, 3);
    assert_eq!(playlist.transcripts, 2);
    assert_eq!(summary.stage("download").unwrap().failed, 1);

    let folder = root.path().join("Talks");
    assert_eq!(file_names(&folder), vec!["a1.txt", "a3.txt", MERGED_FILE_NAME]);

    let merged = std::fs::read_to_string(folder.join(MERGED_FILE_NAME)).unwrap();
    assert_eq!(
        merged,
        "=== a1 ===\n\nspoken words of a1\n\n=== a3 ===\n\nspoken words of a3\n\n"
    );
}

#[tokio::test]
async fn failed_conversion_keeps_the_raw_file() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default().with("pl", Some("Course"), &["bad-convert-1", "ok-2", "ok-3"]);

    let summary = pipeline(settings(root.path()), source, CountingTranscriber::default())
        .run(&refs(&["pl"]))
        .await
        .unwrap();

    assert_eq!(summary.stage("conversion").unwrap().failed, 1);
    assert_eq!(summary.playlists[0].transcripts, 2);
    assert_eq!(
        file_names(&root.path().join("Course")),
        vec!["bad-convert-1.mp4", MERGED_FILE_NAME, "ok-2.txt", "ok-3.txt"]
    );
}

#[tokio::test]
async fn transcriptions_never_overlap() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default()
        .with("one", Some("One"), &["o1", "o2", "o3", "o4"])
        .with("two", Some("Two"), &["t1", "t2", "t3", "t4"])
        .with("three", Some("Three"), &["h1", "h2", "h3"]);
    let transcriber = CountingTranscriber::default();

    let mut config = settings(root.path());
    config.download_concurrency = 8;
    config.conversion_concurrency = 8;

    let summary = pipeline(config, source, transcriber.clone())
        .run(&refs(&["one", "two", "three"]))
        .await
        .unwrap();

    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 11);
    assert_eq!(transcriber.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(summary.total_transcripts(), 11);
    for name in ["One", "Two", "Three"] {
        assert!(root.path().join(name).join(MERGED_FILE_NAME).is_file());
    }
}

#[tokio::test]
async fn colliding_titles_get_numbered_folders() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default()
        .with("first", Some("Same/Title"), &["f1"])
        .with("second", Some("Same/Title"), &["s1"]);

    let summary = pipeline(settings(root.path()), source, CountingTranscriber::default())
        .run(&refs(&["first", "second"]))
        .await
        .unwrap();

    let titles: Vec<&str> = summary.playlists.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Same_Title", "Same_Title_1"]);
    assert_eq!(file_names(&root.path().join("Same_Title")), vec!["f1.txt", MERGED_FILE_NAME]);
    assert_eq!(file_names(&root.path().join("Same_Title_1")), vec![MERGED_FILE_NAME, "s1.txt"]);
}

#[tokio::test]
async fn unresolvable_playlist_still_gets_a_folder() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default().with("known", None, &["k1"]);

    let summary = pipeline(settings(root.path()), source, CountingTranscriber::default())
        .run(&refs(&["missing", "known"]))
        .await
        .unwrap();

    assert_eq!(summary.playlists[0].title, "playlist_unknown");
    assert_eq!(summary.playlists[0].items, 0);
    assert!(summary.playlists[0].merged.is_none());
    assert!(root.path().join("playlist_unknown").is_dir());

    assert_eq!(summary.playlists[1].title, "playlist_unknown_1");
    assert_eq!(summary.playlists[1].transcripts, 1);
}

#[tokio::test]
async fn rescan_handoff_transcribes_the_same_files() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default()
        .with("a", Some("Alpha"), &["x1", "x2"])
        .with("b", Some("Beta"), &["y1"]);

    let mut config = settings(root.path());
    config.handoff = HandoffMode::Rescan;

    let summary = pipeline(config, source, CountingTranscriber::default())
        .run(&refs(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(summary.stage("transcription").unwrap().succeeded, 3);
    assert_eq!(file_names(&root.path().join("Alpha")), vec![MERGED_FILE_NAME, "x1.txt", "x2.txt"]);
    assert_eq!(file_names(&root.path().join("Beta")), vec![MERGED_FILE_NAME, "y1.txt"]);
}

#[tokio::test]
async fn failed_transcription_drops_audio_and_is_left_out_of_the_merge() {
    let root = TempDir::new().unwrap();
    let source = FakeSource::default().with("pl", Some("Podcast"), &["ep1", "mute-ep2", "ep3"]);

    let summary = pipeline(settings(root.path()), source, CountingTranscriber::default())
        .run(&refs(&["pl"]))
        .await
        .unwrap();

    let transcription = summary.stage("transcription").unwrap();
    assert_eq!(transcription.attempted, 3);
    assert_eq!(transcription.failed, 1);
    assert_eq!(summary.playlists[0].transcripts, 2);

    let folder = root.path().join("Podcast");
    assert_eq!(file_names(&folder), vec!["ep1.txt", "ep3.txt", MERGED_FILE_NAME]);

    let merged = std::fs::read_to_string(folder.join(MERGED_FILE_NAME)).unwrap();
    assert!(merged.contains("=== ep1 ==="));
    assert!(merged.contains("=== ep3 ==="));
    assert!(!merged.contains("mute-ep2"));
}

#[tokio::test]
async fn rescan_leaves_unrelated_audio_under_the_root_alone() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("music")).unwrap();
    let favourite = root.path().join("music").join("favourite.mp3");
    std::fs::write(&favourite, b"song").unwrap();
    std::fs::write(root.path().join("loose.mp3"), b"song").unwrap();

    let source = FakeSource::default().with("pl", Some("Lectures"), &["l1"]);
    let mut config = settings(root.path());
    config.handoff = HandoffMode::Rescan;

    let summary = pipeline(config, source, CountingTranscriber::default())
        .run(&refs(&["pl"]))
        .await
        .unwrap();

    assert_eq!(summary.stage("transcription").unwrap().attempted, 1);
    assert!(favourite.exists());
    assert!(root.path().join("loose.mp3").exists());
    assert_eq!(file_names(&root.path().join("Lectures")), vec!["l1.txt", MERGED_FILE_NAME]);
}

#[tokio::test]
async fn zero_worker_count_is_rejected() {
    let root = TempDir::new().unwrap();
    let mut config = settings(root.path());
    config.download_concurrency = 0;

    let err = pipeline(config, FakeSource::default(), CountingTranscriber::default())
        .run(&refs(&["anything"]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("download_concurrency"));
    assert_eq!(file_names(root.path()), Vec::<String>::new());
}

#[tokio::test]
async fn empty_run_reports_nothing() {
    let root = TempDir::new().unwrap();

    let summary = pipeline(settings(root.path()), FakeSource::default(), CountingTranscriber::default())
        .run(&[])
        .await
        .unwrap();

    assert!(summary.playlists.is_empty());
    assert_eq!(summary.stages.len(), 3);
    assert!(summary.stages.iter().all(|report| report.attempted == 0));
}
