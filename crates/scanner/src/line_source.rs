//! Line-oriented decode source.
//!
//! Keyboard-wedge QR readers type each decoded payload followed by Enter.
//! [`LineDecodeSource`] exposes such a reader as a single camera. One
//! reader task drains the input for the life of the source and forwards
//! non-empty lines to the armed sink; lines read while the source is
//! stopped are discarded, never replayed on the next start.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::decode::{CameraInfo, DecodeConfig, DecodeError, DecodeSink, DecodeSource};

type LineReader = Lines<Box<dyn AsyncBufRead + Send + Sync + Unpin>>;

const INPUT_CLOSED: &str = "input device closed";

pub struct LineDecodeSource {
    camera: CameraInfo,
    /// Taken when the reader task is spawned on the first start.
    input: Option<LineReader>,
    armed: watch::Sender<Option<DecodeSink>>,
    reader: Option<(CancellationToken, JoinHandle<()>)>,
}

impl LineDecodeSource {
    pub fn new(
        reader: impl AsyncBufRead + Send + Sync + Unpin + 'static,
        camera: CameraInfo,
    ) -> Self {
        let reader: Box<dyn AsyncBufRead + Send + Sync + Unpin> = Box::new(reader);
        let (armed, _) = watch::channel(None);
        Self {
            camera,
            input: Some(reader.lines()),
            armed,
            reader: None,
        }
    }

    fn input_closed(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|(_, task)| task.is_finished())
    }
}

impl Drop for LineDecodeSource {
    fn drop(&mut self) {
        if let Some((cancel, _)) = &self.reader {
            cancel.cancel();
        }
    }
}

#[async_trait]
impl DecodeSource for LineDecodeSource {
    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, DecodeError> {
        Ok(vec![self.camera.clone()])
    }

    async fn start(
        &mut self,
        camera_id: &str,
        config: &DecodeConfig,
        sink: DecodeSink,
    ) -> Result<(), DecodeError> {
        if camera_id != self.camera.id {
            return Err(DecodeError::CameraNotFound(camera_id.to_string()));
        }
        if self.input_closed() {
            return Err(DecodeError::Device(INPUT_CLOSED.into()));
        }

        let epoch = sink.epoch();
        self.armed.send_replace(Some(sink));
        if let Some(lines) = self.input.take() {
            let cancel = CancellationToken::new();
            let task = tokio::spawn(read_lines(lines, self.armed.subscribe(), cancel.clone()));
            self.reader = Some((cancel, task));
        }

        tracing::debug!(camera = %camera_id, epoch, fps = config.fps, "Line reader armed");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DecodeError> {
        if self.armed.send_replace(None).is_some() {
            tracing::debug!(camera = %self.camera.id, "Line reader disarmed");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.armed.borrow().is_some()
    }
}

async fn read_lines(
    mut lines: LineReader,
    armed: watch::Receiver<Option<DecodeSink>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next_line() => next,
        };
        let sink = armed.borrow().clone();

        match next {
            Ok(Some(line)) => {
                let code = line.trim();
                if code.is_empty() {
                    continue;
                }
                match sink {
                    Some(sink) => {
                        sink.decoded(code);
                    }
                    None => tracing::debug!(code = %code, "Scanner stopped, line discarded"),
                }
            }
            Ok(None) => {
                tracing::warn!("{INPUT_CLOSED}");
                if let Some(sink) = sink {
                    sink.error(INPUT_CLOSED);
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Input device read failed");
                if let Some(sink) = sink {
                    sink.error(format!("input device read failed: {e}"));
                }
                return;
            }
        }
    }
}
