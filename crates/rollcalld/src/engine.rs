use rollcall_core::{EncodingCache, FaceEncoder, MatchResult, Matcher, PipelineError};
use rollcall_hw::{CameraError, Frame, FrameSource};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("engine startup failed: {0}")]
    Startup(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the engine thread to the attendance updater.
#[derive(Debug)]
pub enum EngineEvent {
    /// A known student was matched in a frame.
    Recognized {
        identity: String,
        distance: f32,
        sequence: u32,
    },
    /// Capture or inference failed; the engine thread has stopped.
    Failed(EngineError),
}

/// A face matched in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub identity: String,
    pub distance: f32,
}

/// Encode every face in `frame` and match each against the cache.
///
/// Unknown and ambiguous faces are logged at debug level and dropped.
pub fn process_frame<E: FaceEncoder + ?Sized, M: Matcher + ?Sized>(
    encoder: &mut E,
    cache: &EncodingCache,
    matcher: &M,
    frame: &Frame,
) -> Result<Vec<Recognition>, PipelineError> {
    let faces = encoder.encode(&frame.data, frame.width, frame.height)?;
    let mut out = Vec::new();
    for face in faces {
        match matcher.compare(&face.embedding, cache.encodings()) {
            MatchResult::Known { identity, distance } => {
                tracing::debug!(%identity, distance, sequence = frame.sequence, "face matched");
                out.push(Recognition { identity, distance });
            }
            MatchResult::Ambiguous { candidates, distance } => {
                tracing::debug!(?candidates, distance, sequence = frame.sequence, "ambiguous match ignored");
            }
            MatchResult::Unknown { nearest } => {
                tracing::debug!(?nearest, sequence = frame.sequence, "unknown face");
            }
        }
    }
    Ok(out)
}

/// Spawn the capture loop on a dedicated OS thread.
///
/// `open` runs on that thread and acquires the camera and models; its failure
/// is returned here so startup fails fast. Afterwards the loop discards
/// `warmup_frames`, then captures, encodes and matches until the receiver is
/// dropped or a fault occurs. The bounded channel blocks capture while the
/// updater is busy.
pub async fn spawn_engine<S, E, M, F>(
    open: F,
    cache: EncodingCache,
    matcher: M,
    warmup_frames: usize,
    capacity: usize,
) -> Result<mpsc::Receiver<EngineEvent>, EngineError>
where
    S: FrameSource,
    E: FaceEncoder,
    M: Matcher + Send + 'static,
    F: FnOnce() -> Result<(S, E), EngineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineEvent>(capacity.max(1));
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), EngineError>>();

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let (mut source, mut encoder) = match open() {
                Ok(parts) => {
                    let _ = ready_tx.send(Ok(()));
                    parts
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            tracing::info!(known = cache.len(), "engine thread started");
            run_loop(&mut source, &mut encoder, &cache, &matcher, warmup_frames, &tx);
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| EngineError::Startup(format!("failed to spawn engine thread: {e}")))?;

    ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;
    Ok(rx)
}

fn run_loop<S: FrameSource, E: FaceEncoder, M: Matcher>(
    source: &mut S,
    encoder: &mut E,
    cache: &EncodingCache,
    matcher: &M,
    warmup_frames: usize,
    tx: &mpsc::Sender<EngineEvent>,
) {
    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        for _ in 0..warmup_frames {
            let _ = source.next_frame();
        }
    }

    let mut dark_skipped = 0u64;
    loop {
        if tx.is_closed() {
            return;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(CameraError::Frame(e)) => {
                tracing::debug!(error = %e, "unreadable frame skipped");
                continue;
            }
            Err(e) => {
                let _ = tx.blocking_send(EngineEvent::Failed(e.into()));
                return;
            }
        };

        if frame.is_dark {
            dark_skipped += 1;
            tracing::debug!(sequence = frame.sequence, dark_skipped, "dark frame skipped");
            continue;
        }

        let recognitions = match process_frame(encoder, cache, matcher, &frame) {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.blocking_send(EngineEvent::Failed(e.into()));
                return;
            }
        };

        for Recognition { identity, distance } in recognitions {
            let event = EngineEvent::Recognized {
                identity,
                distance,
                sequence: frame.sequence,
            };
            if tx.blocking_send(event).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rollcall_core::{BoundingBox, EncodedFace, Embedding, FaceEncoding, NearestMatcher};
    use std::collections::VecDeque;

    /// Frame whose first byte selects which identity the fake encoder "sees".
    pub(crate) fn frame_showing(marker: u8, sequence: u32) -> Frame {
        let mut data = vec![128u8; 4 * 4 * 3];
        data[0] = marker;
        Frame::from_rgb(data, 4, 4, sequence).unwrap()
    }

    pub(crate) fn unit(axis: usize) -> Embedding {
        let mut values = vec![0.0; 4];
        values[axis] = 1.0;
        Embedding { values, model_version: None }
    }

    /// Gallery S1 on axis 0, S2 on axis 1.
    pub(crate) fn cache_s1_s2() -> EncodingCache {
        EncodingCache::from_encodings(vec![
            FaceEncoding { identity: "S1".into(), embedding: unit(0) },
            FaceEncoding { identity: "S2".into(), embedding: unit(1) },
        ])
        .unwrap()
    }

    /// Marker 1 → S1's face, 2 → S2's, 3 → a stranger, anything else → no face.
    pub(crate) struct MarkerEncoder;

    impl FaceEncoder for MarkerEncoder {
        fn encode(&mut self, rgb: &[u8], _w: u32, _h: u32) -> Result<Vec<EncodedFace>, PipelineError> {
            let axis = match rgb[0] {
                1 => 0,
                2 => 1,
                3 => 3,
                _ => return Ok(Vec::new()),
            };
            Ok(vec![EncodedFace {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 4.0,
                    height: 4.0,
                    confidence: 0.9,
                    landmarks: None,
                },
                embedding: unit(axis),
            }])
        }
    }

    /// Plays back frames, then reports the device gone.
    pub(crate) struct ScriptedSource(pub VecDeque<Result<Frame, CameraError>>);

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(CameraError::DeviceNotFound("scripted".into())))
        }
    }

    #[test]
    fn test_process_frame_matches_known_face() {
        let cache = cache_s1_s2();
        let out = process_frame(&mut MarkerEncoder, &cache, &NearestMatcher::default(), &frame_showing(1, 0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].identity, "S1");
        assert!(out[0].distance < 1e-6);
    }

    #[test]
    fn test_process_frame_drops_unknown_and_empty() {
        let cache = cache_s1_s2();
        let matcher = NearestMatcher::default();
        // A stranger is sqrt(2) from both, beyond the 1.0 threshold.
        assert!(process_frame(&mut MarkerEncoder, &cache, &matcher, &frame_showing(3, 0)).unwrap().is_empty());
        assert!(process_frame(&mut MarkerEncoder, &cache, &matcher, &frame_showing(0, 0)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_emits_recognitions_then_failure() {
        let mut dark = frame_showing(1, 2);
        dark.is_dark = true;
        let frames = VecDeque::from(vec![
            Ok(frame_showing(0, 0)), // warmup
            Ok(frame_showing(1, 1)),
            Ok(dark),
            Err(CameraError::Frame(rollcall_hw::frame::FrameError::Decode("corrupt".into()))),
            Ok(frame_showing(2, 4)),
        ]);

        let mut rx = spawn_engine(
            move || Ok((ScriptedSource(frames), MarkerEncoder)),
            cache_s1_s2(),
            NearestMatcher::default(),
            1,
            4,
        )
        .await
        .unwrap();

        let mut seen = Vec::new();
        let mut failed = false;
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Recognized { identity, sequence, .. } => seen.push((identity, sequence)),
                EngineEvent::Failed(e) => {
                    assert!(matches!(e, EngineError::Camera(CameraError::DeviceNotFound(_))));
                    failed = true;
                }
            }
        }
        assert_eq!(seen, vec![("S1".to_string(), 1), ("S2".to_string(), 4)]);
        assert!(failed);
    }

    #[tokio::test]
    async fn test_engine_startup_failure_is_returned() {
        let result = spawn_engine(
            || Err::<(ScriptedSource, MarkerEncoder), _>(EngineError::Startup("no camera".into())),
            cache_s1_s2(),
            NearestMatcher::default(),
            0,
            1,
        )
        .await;
        assert!(matches!(result, Err(EngineError::Startup(_))));
    }
}
