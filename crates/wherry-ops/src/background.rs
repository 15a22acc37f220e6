//! Background execution bridge.
//!
//! A whole operation can run on a subordinate worker thread so the
//! UI-owning thread stays responsive. The worker never touches the UI:
//! every UI-affecting call is marshalled to the owner as a typed request
//! over a channel, and the worker blocks until the typed response comes
//! back — a synchronous request/response RPC over the thread boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};
use wherry_core::{
    DirListing, ErrorChoice, FileProgress, NameTransform, OpError, OperationOptions, OperationUi,
    PartialChoice, PollChoice, RecursiveChoice, ReplaceChoice, TotalProgress,
};
use wherry_vfs::{Metadata, Vfs};

use crate::operate::{OperateSpec, operate};

/// A UI-affecting call marshalled from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UiRequest {
    ShowSource(Option<PathBuf>),
    ShowTarget(Option<PathBuf>),
    ShowDeleting(PathBuf),
    FileProgress(FileProgress),
    TotalProgress(TotalProgress),
    Poll,
    Report { error: OpError, retryable: bool },
    Note(String),
    ConfirmOverwrite {
        source: PathBuf,
        source_meta: Metadata,
        dest: PathBuf,
        dest_meta: Metadata,
    },
    ConfirmRecursiveDelete(PathBuf),
    ConfirmPartial(PathBuf),
}

/// The typed response to one [`UiRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UiResponse {
    Ack,
    Poll(PollChoice),
    Error(ErrorChoice),
    Replace(ReplaceChoice),
    Recursive(RecursiveChoice),
    Partial(PartialChoice),
}

struct Envelope {
    request: UiRequest,
    reply: Sender<UiResponse>,
}

/// A running background operation.
///
/// The owner services collaborator requests with its own UI until the
/// worker finishes and reports its final status.
pub struct BackgroundOperation {
    requests: Receiver<Envelope>,
    handle: JoinHandle<(bool, DirListing)>,
}

/// Dispatch one operation to a worker thread.
///
/// The listing is moved into the worker and handed back with the final
/// status, so panel reconciliation happens in the owning thread.
pub fn operate_in_background(
    fs: Arc<dyn Vfs>,
    mut listing: DirListing,
    spec: OperateSpec,
    opts: OperationOptions,
    transform: Arc<dyn NameTransform + Send + Sync>,
) -> std::io::Result<BackgroundOperation> {
    let (tx, requests) = bounded(1);
    let handle = std::thread::Builder::new()
        .name("wherry-op".into())
        .spawn(move || {
            let mut ui = RemoteUi { requests: tx };
            let changed = operate(
                fs.as_ref(),
                &mut listing,
                &spec,
                opts,
                transform.as_ref(),
                &mut ui,
            );
            (changed, listing)
        })?;
    Ok(BackgroundOperation { requests, handle })
}

impl BackgroundOperation {
    /// Service the worker's requests with `ui` until it completes, then
    /// return its final (changed, listing) report.
    pub fn drive(self, ui: &mut dyn OperationUi) -> (bool, DirListing) {
        // The iterator ends when the worker drops its sender on exit.
        for envelope in self.requests.iter() {
            let response = dispatch(envelope.request, ui);
            let _ = envelope.reply.send(response);
        }
        match self.handle.join() {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!("background worker panicked");
                (false, DirListing::new())
            }
        }
    }
}

/// Apply one marshalled request to a real UI and produce its response.
fn dispatch(request: UiRequest, ui: &mut dyn OperationUi) -> UiResponse {
    match request {
        UiRequest::ShowSource(path) => {
            ui.show_source(path.as_deref());
            UiResponse::Ack
        }
        UiRequest::ShowTarget(path) => {
            ui.show_target(path.as_deref());
            UiResponse::Ack
        }
        UiRequest::ShowDeleting(path) => {
            ui.show_deleting(&path);
            UiResponse::Ack
        }
        UiRequest::FileProgress(progress) => {
            ui.show_file_progress(&progress);
            UiResponse::Ack
        }
        UiRequest::TotalProgress(progress) => {
            ui.show_total_progress(&progress);
            UiResponse::Ack
        }
        UiRequest::Poll => UiResponse::Poll(ui.poll()),
        UiRequest::Report { error, retryable } => UiResponse::Error(ui.report(&error, retryable)),
        UiRequest::Note(message) => {
            ui.note(&message);
            UiResponse::Ack
        }
        UiRequest::ConfirmOverwrite {
            source,
            source_meta,
            dest,
            dest_meta,
        } => UiResponse::Replace(ui.confirm_overwrite(&source, &source_meta, &dest, &dest_meta)),
        UiRequest::ConfirmRecursiveDelete(path) => {
            UiResponse::Recursive(ui.confirm_recursive_delete(&path))
        }
        UiRequest::ConfirmPartial(path) => UiResponse::Partial(ui.confirm_partial(&path)),
    }
}

/// The worker-side collaborator: forwards every call to the owning thread
/// and blocks on the reply.
struct RemoteUi {
    requests: Sender<Envelope>,
}

impl RemoteUi {
    fn call(&self, request: UiRequest) -> Option<UiResponse> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .ok()?;
        reply_rx.recv().ok()
    }
}

impl OperationUi for RemoteUi {
    fn show_source(&mut self, path: Option<&Path>) {
        let _ = self.call(UiRequest::ShowSource(path.map(Path::to_path_buf)));
    }

    fn show_target(&mut self, path: Option<&Path>) {
        let _ = self.call(UiRequest::ShowTarget(path.map(Path::to_path_buf)));
    }

    fn show_deleting(&mut self, path: &Path) {
        let _ = self.call(UiRequest::ShowDeleting(path.to_path_buf()));
    }

    fn show_file_progress(&mut self, progress: &FileProgress) {
        let _ = self.call(UiRequest::FileProgress(*progress));
    }

    fn show_total_progress(&mut self, progress: &TotalProgress) {
        let _ = self.call(UiRequest::TotalProgress(*progress));
    }

    fn poll(&mut self) -> PollChoice {
        // A vanished owner means nobody can answer prompts any more; the
        // only safe direction is out.
        match self.call(UiRequest::Poll) {
            Some(UiResponse::Poll(choice)) => choice,
            _ => PollChoice::Abort,
        }
    }

    fn report(&mut self, error: &OpError, retryable: bool) -> ErrorChoice {
        match self.call(UiRequest::Report {
            error: error.clone(),
            retryable,
        }) {
            Some(UiResponse::Error(choice)) => choice,
            _ => ErrorChoice::Abort,
        }
    }

    fn note(&mut self, message: &str) {
        let _ = self.call(UiRequest::Note(message.to_owned()));
    }

    fn confirm_overwrite(
        &mut self,
        source: &Path,
        source_meta: &Metadata,
        dest: &Path,
        dest_meta: &Metadata,
    ) -> ReplaceChoice {
        match self.call(UiRequest::ConfirmOverwrite {
            source: source.to_path_buf(),
            source_meta: *source_meta,
            dest: dest.to_path_buf(),
            dest_meta: *dest_meta,
        }) {
            Some(UiResponse::Replace(choice)) => choice,
            _ => ReplaceChoice::Abort,
        }
    }

    fn confirm_recursive_delete(&mut self, path: &Path) -> RecursiveChoice {
        match self.call(UiRequest::ConfirmRecursiveDelete(path.to_path_buf())) {
            Some(UiResponse::Recursive(choice)) => choice,
            _ => RecursiveChoice::Abort,
        }
    }

    fn confirm_partial(&mut self, dest: &Path) -> PartialChoice {
        match self.call(UiRequest::ConfirmPartial(dest.to_path_buf())) {
            Some(UiResponse::Partial(choice)) => choice,
            _ => PartialChoice::Keep,
        }
    }
}
