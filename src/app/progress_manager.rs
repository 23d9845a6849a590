//! Progress bars driven by download events.

use std::collections::HashMap;
use std::time::Duration;

use batchfetch_core::{ChannelObserver, DownloadEvent, TransferStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Spawns the progress UI for a batch of `total` resources.
///
/// The task ends once every clone of the returned observer is dropped.
pub(crate) fn spawn_progress_ui(total: usize) -> (ChannelObserver, JoinHandle<()>) {
    let (observer, events) = ChannelObserver::new();
    let view = ProgressView::new(MultiProgress::new(), total);
    let handle = tokio::spawn(drive(view, events));
    (observer, handle)
}

async fn drive(mut view: ProgressView, mut events: UnboundedReceiver<DownloadEvent>) {
    while let Some(event) = events.recv().await {
        view.apply(&event);
    }
    view.finish();
}

struct ProgressView {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: HashMap<String, ProgressBar>,
    failed: u64,
}

impl ProgressView {
    fn new(multi: MultiProgress, total: usize) -> Self {
        let overall = multi.add(ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX)));
        overall.set_style(
            ProgressStyle::with_template("[{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        overall.set_message("downloading");
        Self {
            multi,
            overall,
            bars: HashMap::new(),
            failed: 0,
        }
    }

    fn apply(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Progress {
                filename,
                downloaded_bytes,
                total_bytes,
            } => {
                let bar = self.bar_for(filename, *total_bytes);
                if let Some(total) = total_bytes {
                    bar.set_length(*total);
                }
                bar.set_position(*downloaded_bytes);
            }
            DownloadEvent::Status {
                filename,
                status,
                info,
            } => {
                if let Some(bar) = self.bars.remove(filename) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                if *status == TransferStatus::Failed {
                    self.failed += 1;
                    let _ = self.multi.println(format!("failed {filename}: {info}"));
                }
                self.overall.inc(1);
                self.overall.set_message(format!("{} failed", self.failed));
            }
        }
    }

    fn bar_for(&mut self, filename: &str, total: Option<u64>) -> &ProgressBar {
        self.bars.entry(filename.to_string()).or_insert_with(|| {
            let bar = match total {
                Some(len) => {
                    let bar = ProgressBar::new(len);
                    bar.set_style(file_style());
                    bar
                }
                None => {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(
                        ProgressStyle::with_template("{spinner} {bytes} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    bar.enable_steady_tick(Duration::from_millis(120));
                    bar
                }
            };
            bar.set_message(filename.to_string());
            self.multi.add(bar)
        })
    }

    fn finish(&mut self) {
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
    }
}

fn file_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:30} {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
