//! Pipeline lifecycle states and the per-run transcode report.
//!
//! [`PipelineState`] is the controller's state machine:
//!
//! ```text
//! Opening ──stages open, header written──▶ Streaming
//!         ──end of input / abort / fatal error──▶ Draining
//!         ──partial chunks flushed──▶ Closed
//! ```
//!
//! No path skips `Draining`.  [`TranscodeReport`] collects the sample
//! accounting of one run and is serialised to JSON by the CLI.

use serde::Serialize;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// States of one transcode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Negotiating frame sizes and opening stages.  No output produced yet.
    Opening,

    /// Pulling packets through decode → adapt → denoise → encode → mux.
    Streaming,

    /// Input exhausted (or aborted); flushing decoder, reconcilers and encoder.
    Draining,

    /// Trailer written and every stage released.
    Closed,
}

impl PipelineState {
    /// A short human-readable label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Opening => "OPENING",
            PipelineState::Streaming => "STREAMING",
            PipelineState::Draining => "DRAINING",
            PipelineState::Closed => "CLOSED",
        }
    }

    /// The state that follows this one.  `Closed` is terminal.
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Opening => Some(PipelineState::Streaming),
            PipelineState::Streaming => Some(PipelineState::Draining),
            PipelineState::Draining => Some(PipelineState::Closed),
            PipelineState::Closed => None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Opening
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// TranscodeReport
// ---------------------------------------------------------------------------

/// Sample accounting and signal levels for one run.
///
/// Lengths are in samples-per-channel unless noted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscodeReport {
    pub input_codec: String,
    pub sample_rate: u32,
    pub output_channels: u16,
    /// Negotiated denoise chunk length (N1).
    pub denoise_frame_len: usize,
    /// Encoder block length (N2).
    pub encoder_frame_len: usize,

    /// Audio-stream packets read from the demuxer.
    pub packets_read: u64,
    /// Packets of other streams, skipped.
    pub packets_ignored: u64,
    /// Packets whose decode failed and whose samples are absent.
    pub decode_failures: u64,
    pub frames_decoded: u64,
    /// Samples-per-channel leaving the format adapter.
    pub samples_adapted: u64,

    pub denoise_chunks: u64,
    /// Padding added by the decode→denoise reconciler's final flush.
    pub denoise_padding: usize,
    pub encoder_chunks: u64,
    /// Total padding carried by the last encoder chunks (both boundaries).
    pub encoder_padding: usize,
    pub encode_failures: u64,

    pub packets_written: u64,
    /// Samples-per-channel of real audio handed to the muxer.
    pub samples_written: u64,

    pub input_rms_dbfs: f32,
    pub input_peak_dbfs: f32,
    pub output_rms_dbfs: f32,
    pub output_peak_dbfs: f32,
    /// Interleaved input samples at full scale.
    pub clipped_input_samples: u64,

    /// Streaming was cut short by an abort request.
    pub aborted: bool,
    pub final_state: PipelineState,
}

impl TranscodeReport {
    /// Samples-per-channel passed to the encoder, padding included.
    pub fn samples_encoded(&self) -> u64 {
        self.encoder_chunks * self.encoder_frame_len as u64
    }

    /// Output duration in seconds.
    pub fn output_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples_written as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_opening() {
        assert_eq!(PipelineState::default(), PipelineState::Opening);
    }

    #[test]
    fn states_advance_in_order_and_close_is_terminal() {
        let mut state = PipelineState::Opening;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                PipelineState::Opening,
                PipelineState::Streaming,
                PipelineState::Draining,
                PipelineState::Closed
            ]
        );
    }

    #[test]
    fn labels_and_display() {
        assert_eq!(PipelineState::Draining.label(), "DRAINING");
        assert_eq!(PipelineState::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn report_serialises_to_json() {
        let report = TranscodeReport {
            sample_rate: 8_000,
            encoder_frame_len: 1152,
            encoder_chunks: 21,
            samples_written: 24_000,
            final_state: PipelineState::Closed,
            ..TranscodeReport::default()
        };
        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["final_state"], "closed");
        assert_eq!(json["encoder_chunks"], 21);
        assert_eq!(report.samples_encoded(), 24_192);
        assert!((report.output_secs() - 3.0).abs() < 1e-9);
    }
}
