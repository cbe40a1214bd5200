use std::io::{self, BufRead, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use serde_json::Value;
use studio_contracts::chat::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use studio_contracts::image::EncodedImage;
use studio_contracts::presets::{PresetCatalog, StyleMode, SubjectCategory};
use studio_contracts::runs::TaskStatus;
use studio_engine::{
    load_source_image, CancelToken, Declined, RunOutcome, Runner, CUSTOM_DISPLAY_NAME,
};

use crate::{export_into, print_report, Studio};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub image: Option<PathBuf>,
    pub out: PathBuf,
    pub category: SubjectCategory,
    pub mode: StyleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub fn run_session(studio: Studio, catalog: PresetCatalog, options: SessionOptions) -> Result<()> {
    let mut session = Session::new(studio, catalog, options)?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    println!("Portrait Studio session started. Type /help for commands.");
    session.print_selection();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }
        if session.handle_line(line.trim_end_matches(['\n', '\r'])) == Flow::Quit {
            break;
        }
    }

    session.shutdown();
    Ok(())
}

/// The batch worker with its cancel token. Ad hoc runs never get one.
struct BatchRun {
    token: CancelToken,
    worker: JoinHandle<Option<usize>>,
}

struct Session {
    studio: Studio,
    catalog: PresetCatalog,
    category: SubjectCategory,
    mode: StyleMode,
    source: Option<EncodedImage>,
    source_path: Option<PathBuf>,
    out_dir: PathBuf,
    batch: Option<BatchRun>,
    batch_cancelled: bool,
    workers: Vec<JoinHandle<Option<usize>>>,
}

impl Session {
    fn new(studio: Studio, catalog: PresetCatalog, options: SessionOptions) -> Result<Self> {
        let mut session = Self {
            studio,
            catalog,
            category: options.category,
            mode: options.mode,
            source: None,
            source_path: None,
            out_dir: options.out,
            batch: None,
            batch_cancelled: false,
            workers: Vec::new(),
        };
        if let Some(path) = options.image {
            let image = load_source_image(&path)
                .with_context(|| format!("failed loading source image {}", path.display()))?;
            session.source = Some(image);
            session.source_path = Some(path);
        }
        Ok(session)
    }

    fn runner(&self) -> &Runner {
        &self.studio.runner
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        let intent = parse_intent(line);
        match intent.action.as_str() {
            "noop" => {}
            "help" => println!("Commands: {}", SESSION_HELP_COMMANDS.join(" ")),
            "set_category" => self.set_category(intent.arg_str("value")),
            "set_mode" => self.set_mode(intent.arg_str("value")),
            "set_selection" => self.apply_selection(&intent),
            "set_image" => self.set_image(intent.arg_str("path")),
            "list_presets" => self.list_presets(),
            "generate_batch" => self.generate_batch(),
            "custom" => self.generate_custom(intent.prompt.clone().unwrap_or_default()),
            "status" => self.print_status(),
            "cancel" => {
                self.cancel();
            }
            "clear" => self.clear(),
            "save" => self.save(intent.arg_str("path").map(PathBuf::from)),
            "quit" => return Flow::Quit,
            "unknown" => {
                let command = intent.arg_str("command").unwrap_or("unknown");
                println!("Unknown command: /{command}");
            }
            other => println!("Unknown command: {other}"),
        }
        Flow::Continue
    }

    fn print_selection(&self) {
        println!(
            "Selection: {} / {} ({} presets)",
            self.category,
            self.mode,
            self.catalog.presets(self.category, self.mode).len()
        );
    }

    fn set_category(&mut self, value: Option<&str>) {
        match value.map(str::parse::<SubjectCategory>) {
            Some(Ok(category)) => {
                self.category = category;
                self.print_selection();
            }
            Some(Err(err)) => println!("{err}"),
            None => self.print_selection(),
        }
    }

    fn set_mode(&mut self, value: Option<&str>) {
        match value.map(str::parse::<StyleMode>) {
            Some(Ok(mode)) => {
                self.mode = mode;
                self.print_selection();
            }
            Some(Err(err)) => println!("{err}"),
            None => self.print_selection(),
        }
    }

    fn apply_selection(&mut self, intent: &Intent) {
        let value = |key: &str| intent.selection_update.get(key).and_then(Value::as_str);
        if let Some(category) = value("category").and_then(|raw| raw.parse::<SubjectCategory>().ok()) {
            self.category = category;
        }
        if let Some(mode) = value("mode").and_then(|raw| raw.parse::<StyleMode>().ok()) {
            self.mode = mode;
        }
        self.print_selection();
    }

    fn set_image(&mut self, path: Option<&str>) {
        let Some(path) = path else {
            println!("/image requires a path");
            return;
        };
        let path = PathBuf::from(path);
        match load_source_image(&path) {
            Ok(image) => {
                println!("Source image set to {} ({})", path.display(), image.mime_type());
                self.source = Some(image);
                self.source_path = Some(path);
            }
            Err(err) => println!("Could not load image: {err}"),
        }
    }

    fn list_presets(&self) {
        let presets = self.catalog.presets(self.category, self.mode);
        println!(
            "{} for {} ({}):",
            self.mode.batch_label(),
            self.category,
            presets.len()
        );
        for (index, preset) in presets.iter().enumerate() {
            println!("  {:>2}. {}", index + 1, preset.display_name);
        }
    }

    fn generate_batch(&mut self) {
        self.reap();
        if self.runner().is_busy() {
            println!("Declined: {}", Declined::Busy);
            return;
        }
        let presets = self.catalog.presets(self.category, self.mode).to_vec();
        let source = self.source.clone();
        let token = CancelToken::new();
        let worker_token = token.clone();
        println!(
            "Generating {} {} for {}...",
            presets.len(),
            self.mode.batch_label(),
            self.category
        );
        let worker = self.spawn(move |runner| {
            runner.run_batch_with_cancel(source.as_ref(), &presets, &worker_token)
        });
        if let Some(previous) = self.batch.replace(BatchRun { token, worker }) {
            self.workers.push(previous.worker);
        }
    }

    fn generate_custom(&mut self, prompt: String) {
        self.reap();
        let source = self.source.clone();
        let worker =
            self.spawn(move |runner| runner.run_one(source.as_ref(), &prompt, CUSTOM_DISPLAY_NAME));
        self.workers.push(worker);
    }

    /// Runs `job` on a worker thread; the handle yields the run's cancelled
    /// task count, or `None` when the run was declined.
    fn spawn<F>(&self, job: F) -> JoinHandle<Option<usize>>
    where
        F: FnOnce(&Runner) -> RunOutcome + Send + 'static,
    {
        let runner = Arc::clone(&self.studio.runner);
        thread::spawn(move || match job(runner.as_ref()) {
            RunOutcome::Declined(reason) => {
                println!("Declined: {reason}");
                None
            }
            RunOutcome::Finished(report) => {
                print_report(&report);
                Some(report.cancelled)
            }
        })
    }

    fn reap(&mut self) {
        if self
            .batch
            .as_ref()
            .is_some_and(|batch| batch.worker.is_finished())
        {
            self.settle_batch();
        }
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|handle| handle.is_finished());
        for handle in finished {
            join_worker(handle);
        }
        self.workers = running;
    }

    fn wait_idle(&mut self) {
        self.settle_batch();
        for handle in std::mem::take(&mut self.workers) {
            join_worker(handle);
        }
    }

    /// Joins the batch worker, if any, and remembers whether the batch that
    /// now fills the results was cut short.
    fn settle_batch(&mut self) {
        if let Some(batch) = self.batch.take() {
            if let Some(cancelled) = join_worker(batch.worker) {
                self.batch_cancelled = cancelled > 0;
            }
        }
    }

    fn print_status(&self) {
        let results = self.runner().results();
        let counts = results.counts();
        let source = self
            .source_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "Source: {source} | {} | {} pending, {} succeeded, {} failed",
            if self.runner().is_busy() { "running" } else { "idle" },
            counts.pending,
            counts.succeeded,
            counts.failed
        );
        for task in results.iter() {
            match &task.status {
                TaskStatus::Pending => println!("  ...   {}", task.display_name),
                TaskStatus::Succeeded { .. } => println!("  ok    {}", task.display_name),
                TaskStatus::Failed { message } => {
                    println!("  fail  {}: {message}", task.display_name)
                }
            }
        }
    }

    /// Cancels the running batch. Returns `false` when no batch is running,
    /// even if an ad hoc edit is in flight.
    fn cancel(&mut self) -> bool {
        self.reap();
        match &self.batch {
            Some(batch) if !batch.worker.is_finished() => {
                batch.token.cancel();
                println!("Cancelling; the request in flight will finish first.");
                true
            }
            _ => {
                println!("No batch run in progress.");
                false
            }
        }
    }

    fn clear(&mut self) {
        if let Some(batch) = &self.batch {
            batch.token.cancel();
        }
        self.runner().clear();
        self.batch_cancelled = false;
        self.source = None;
        self.source_path = None;
        println!("Cleared source image and results.");
    }

    fn save(&mut self, dir: Option<PathBuf>) {
        let dir = dir.unwrap_or_else(|| self.out_dir.clone());
        if self.runner().is_busy() {
            println!("A run is still in progress; saving finished images only.");
        }
        self.reap();
        let results = self.runner().results();
        if let Err(err) = export_into(&self.studio, &results, &dir, self.batch_cancelled) {
            println!("Save failed: {err:#}");
        }
    }

    fn shutdown(&mut self) {
        if let Some(batch) = &self.batch {
            batch.token.cancel();
        }
        self.wait_idle();
    }
}

fn join_worker(handle: JoinHandle<Option<usize>>) -> Option<usize> {
    handle.join().unwrap_or_else(|_| {
        log::error!("generation worker panicked");
        None
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use image::{Rgb, RgbImage};
    use studio_contracts::image::EncodedImage;
    use studio_contracts::presets::{PresetCatalog, StyleMode, SubjectCategory};
    use studio_contracts::runs::now_utc_iso;
    use studio_engine::{DryrunEditClient, EditClient, RemoteError, Runner, RunnerConfig};

    use super::{Flow, Session, SessionOptions};
    use crate::Studio;

    /// Dryrun output, except the prompt "hold" blocks until released.
    struct GatedClient {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl EditClient for GatedClient {
        fn name(&self) -> &str {
            "gated"
        }

        fn edit(&self, source: &EncodedImage, prompt: &str) -> Result<EncodedImage, RemoteError> {
            if prompt == "hold" {
                let _ = self.release.lock().unwrap().recv();
            }
            DryrunEditClient::new().edit(source, prompt)
        }
    }

    fn session(out: PathBuf) -> Session {
        session_with(Arc::new(DryrunEditClient::new()), out)
    }

    fn session_with(client: Arc<dyn EditClient>, out: PathBuf) -> Session {
        let runner = Runner::new(
            client,
            RunnerConfig {
                pacing_delay: Duration::ZERO,
            },
        );
        let studio = Studio {
            runner: Arc::new(runner),
            run_id: "run-test".to_string(),
            started_at: now_utc_iso(),
        };
        Session::new(
            studio,
            PresetCatalog::builtin(),
            SessionOptions {
                image: None,
                out,
                category: SubjectCategory::default(),
                mode: StyleMode::default(),
            },
        )
        .unwrap()
    }

    #[test]
    fn selection_commands_update_category_and_mode() {
        let temp = tempfile::tempdir().unwrap();
        let mut session = session(temp.path().to_path_buf());
        assert_eq!(session.category, SubjectCategory::Male);

        session.handle_line("/female");
        session.handle_line("/mode fashion");
        assert_eq!(session.category, SubjectCategory::Female);
        assert_eq!(session.mode, StyleMode::Fashion);

        session.handle_line("/category robots");
        assert_eq!(session.category, SubjectCategory::Female);
        session.handle_line("/gender male");
        assert_eq!(session.category, SubjectCategory::Male);
    }

    #[test]
    fn generation_without_image_is_declined() {
        let temp = tempfile::tempdir().unwrap();
        let mut session = session(temp.path().to_path_buf());
        session.handle_line("/generate");
        session.handle_line("add sunglasses");
        session.wait_idle();
        assert!(session.runner().results().is_empty());
    }

    #[test]
    fn full_session_generates_saves_and_clears() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = write_photo(temp.path());
        let mut session = session(temp.path().join("out"));

        session.handle_line(&format!("/image {}", photo.display()));
        assert!(session.source.is_some());

        assert_eq!(session.handle_line("/generate"), Flow::Continue);
        session.wait_idle();
        assert_eq!(session.runner().results().counts().succeeded, 9);

        session.handle_line("add sunglasses");
        session.wait_idle();
        let results = session.runner().results();
        assert_eq!(results.len(), 10);
        assert!(results.tasks()[0].id.starts_with("custom-"));

        session.handle_line("/save");
        let mut files: Vec<String> = fs::read_dir(temp.path().join("out"))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        files.sort();
        assert_eq!(files.len(), 11);
        assert!(files.contains(&"summary.json".to_string()));
        assert!(files.iter().any(|name| name.starts_with("portrait-custom-edit-")));

        session.handle_line("/clear");
        assert!(session.source.is_none());
        assert!(session.runner().results().is_empty());
        assert_eq!(session.handle_line("/quit"), Flow::Quit);
        Ok(())
    }

    fn write_photo(dir: &Path) -> PathBuf {
        let photo = dir.join("me.png");
        RgbImage::from_pixel(8, 8, Rgb([90, 60, 30])).save(&photo).unwrap();
        photo
    }

    #[test]
    fn cancel_ignores_finished_batch_while_custom_edit_runs() {
        let temp = tempfile::tempdir().unwrap();
        let (release_tx, release_rx) = mpsc::channel();
        let client = Arc::new(GatedClient {
            release: Mutex::new(release_rx),
        });
        let mut session = session_with(client, temp.path().join("out"));
        session.handle_line(&format!("/image {}", write_photo(temp.path()).display()));

        session.handle_line("/generate");
        session.wait_idle();
        assert_eq!(session.runner().results().counts().succeeded, 9);

        session.handle_line("hold");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.runner().is_busy() {
            assert!(Instant::now() < deadline, "custom edit never started");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!session.cancel());

        release_tx.send(()).unwrap();
        session.wait_idle();
        let counts = session.runner().results().counts();
        assert_eq!((counts.succeeded, counts.failed), (10, 0));
        assert!(!session.batch_cancelled);
    }

    #[test]
    fn bad_image_path_keeps_previous_source() {
        let temp = tempfile::tempdir().unwrap();
        let mut session = session(temp.path().to_path_buf());
        session.handle_line("/image does-not-exist.png");
        assert!(session.source.is_none());
        assert_eq!(session.handle_line("/bogus"), Flow::Continue);
        assert_eq!(session.handle_line("/cancel"), Flow::Continue);
    }
}
