//! Ordered effect chain and the per-session render gate

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::buffer::SampleBuffer;
use crate::effects::{
    apply_eq, chorus, compress, delay, distort, flanger, high_pass, limit, low_pass, reverb,
    CompressorParams, DelayParams, DistortionParams, EqBand, LimiterParams, ModulationParams,
    PassFilter, ReverbParams,
};
use crate::error::{AudioError, Result};
use crate::transform;

/// One processing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Eq { bands: Vec<EqBand> },
    HighPass(PassFilter),
    LowPass(PassFilter),
    Compressor(CompressorParams),
    Distortion(DistortionParams),
    Limiter(LimiterParams),
    Delay(DelayParams),
    Chorus(ModulationParams),
    Flanger(ModulationParams),
    Reverb(ReverbParams),
    /// Gain change in dB
    Gain { db: f32 },
    /// Peak normalization to a linear level
    Normalize { level: f32 },
    /// Fade durations in seconds
    Fade { fade_in: f64, fade_out: f64 },
    NoiseGate { threshold: f32 },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Eq { .. } => "eq",
            Effect::HighPass(_) => "high_pass",
            Effect::LowPass(_) => "low_pass",
            Effect::Compressor(_) => "compressor",
            Effect::Distortion(_) => "distortion",
            Effect::Limiter(_) => "limiter",
            Effect::Delay(_) => "delay",
            Effect::Chorus(_) => "chorus",
            Effect::Flanger(_) => "flanger",
            Effect::Reverb(_) => "reverb",
            Effect::Gain { .. } => "gain",
            Effect::Normalize { .. } => "normalize",
            Effect::Fade { .. } => "fade",
            Effect::NoiseGate { .. } => "noise_gate",
        }
    }

    /// Check parameters without touching any audio
    ///
    /// Frequency limits that depend on the sample rate are checked when the
    /// stage runs.
    pub fn validate(&self) -> Result<()> {
        match self {
            Effect::Eq { bands } => bands.iter().try_for_each(EqBand::validate),
            Effect::HighPass(p) | Effect::LowPass(p) => p.validate(),
            Effect::Compressor(p) => p.validate(),
            Effect::Distortion(p) => p.validate(),
            Effect::Limiter(p) => p.validate(),
            Effect::Delay(p) => p.validate(),
            Effect::Chorus(p) | Effect::Flanger(p) => p.validate(),
            Effect::Reverb(p) => p.validate(),
            Effect::Gain { db } if !db.is_finite() => {
                Err(AudioError::invalid("gain_db", "must be finite"))
            }
            Effect::Normalize { level } if !(*level > 0.0) || !level.is_finite() => Err(
                AudioError::invalid("target_level", format!("must be positive, got {level}")),
            ),
            Effect::Fade { fade_in, fade_out }
                if !(*fade_in >= 0.0 && *fade_out >= 0.0)
                    || !fade_in.is_finite()
                    || !fade_out.is_finite() =>
            {
                Err(AudioError::invalid(
                    "fade",
                    format!("durations must be non-negative, got {fade_in} / {fade_out}"),
                ))
            }
            Effect::NoiseGate { threshold } if !(*threshold >= 0.0) => Err(AudioError::invalid(
                "threshold",
                format!("must be non-negative, got {threshold}"),
            )),
            Effect::Gain { .. }
            | Effect::Normalize { .. }
            | Effect::Fade { .. }
            | Effect::NoiseGate { .. } => Ok(()),
        }
    }

    /// Run this stage on `buffer`
    pub fn apply(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        match self {
            Effect::Eq { bands } => apply_eq(buffer, bands),
            Effect::HighPass(p) => high_pass(buffer, p),
            Effect::LowPass(p) => low_pass(buffer, p),
            Effect::Compressor(p) => compress(buffer, p),
            Effect::Distortion(p) => distort(buffer, p),
            Effect::Limiter(p) => limit(buffer, p),
            Effect::Delay(p) => delay(buffer, p),
            Effect::Chorus(p) => chorus(buffer, p),
            Effect::Flanger(p) => flanger(buffer, p),
            Effect::Reverb(p) => reverb(buffer, p),
            Effect::Gain { db } => transform::apply_gain_db(buffer, *db),
            Effect::Normalize { level } => transform::normalize(buffer, *level),
            Effect::Fade { fade_in, fade_out } => transform::fade(buffer, *fade_in, *fade_out),
            Effect::NoiseGate { threshold } => transform::noise_gate(buffer, *threshold),
        }
    }

    /// Frames this stage appends after its input
    pub fn tail_frames(&self, sample_rate: u32) -> usize {
        match self {
            Effect::Delay(p) => p.tail_frames(sample_rate),
            Effect::Chorus(p) | Effect::Flanger(p) => p.tail_frames(sample_rate),
            Effect::Reverb(p) => p.tail_frames(sample_rate),
            _ => 0,
        }
    }
}

/// Effects applied in insertion order, each feeding the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    effects: Vec<Effect>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) -> &mut Self {
        self.effects.push(effect);
        self
    }

    /// Builder-style push
    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Validate every stage; stops at the first bad one
    pub fn validate(&self) -> Result<()> {
        self.effects.iter().try_for_each(Effect::validate)
    }

    /// Output length for an input of `input_frames` frames
    pub fn expected_frames(&self, input_frames: usize, sample_rate: u32) -> usize {
        input_frames
            + self
                .effects
                .iter()
                .map(|e| e.tail_frames(sample_rate))
                .sum::<usize>()
    }

    /// Run all stages
    ///
    /// Parameters are validated before any processing. A failing stage aborts
    /// the render and nothing partial is returned.
    #[instrument(skip_all, fields(stages = self.effects.len(), frames = buffer.frame_count()))]
    pub fn render(&self, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        self.validate()?;

        let mut current = buffer.clone();
        for effect in &self.effects {
            current = effect.apply(&current)?;
            debug!(effect = effect.name(), frames = current.frame_count(), "stage done");
        }
        Ok(current)
    }
}

impl FromIterator<Effect> for EffectChain {
    fn from_iter<T: IntoIterator<Item = Effect>>(iter: T) -> Self {
        Self {
            effects: iter.into_iter().collect(),
        }
    }
}

/// Serializes renders for one editing session
///
/// A render started while another is in flight waits for it to finish.
#[derive(Debug, Default)]
pub struct RenderSession {
    gate: Mutex<()>,
    renders: AtomicU64,
}

impl RenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `buffer` through `chain`, blocking while another render runs
    pub fn render(&self, chain: &EffectChain, buffer: &SampleBuffer) -> Result<SampleBuffer> {
        let _guard = self.gate.lock();
        let output = chain.render(buffer)?;
        let count = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            render = count,
            frames = output.frame_count(),
            channels = output.num_channels(),
            "render complete"
        );
        Ok(output)
    }

    /// Whether a render is currently running
    pub fn is_rendering(&self) -> bool {
        self.gate.is_locked()
    }

    /// Number of successful renders so far
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn sine(frames: usize, sample_rate: u32) -> SampleBuffer {
        let samples = (0..frames)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * 0.5)
            .collect();
        SampleBuffer::mono(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_chain_runs_in_order() {
        let buffer = SampleBuffer::mono(vec![0.2, -0.5, 0.1], 8000).unwrap();
        let chain = EffectChain::new()
            .with(Effect::Normalize { level: 1.0 })
            .with(Effect::Limiter(LimiterParams::new(0.5).unwrap()));

        let out = chain.render(&buffer).unwrap();
        assert_eq!(out.channel(0).unwrap(), &[0.4, -0.5, 0.2]);

        let reversed: EffectChain = chain.effects().iter().rev().cloned().collect();
        let out = reversed.render(&buffer).unwrap();
        assert!((out.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_expected_frames_matches_render() {
        let sample_rate = 1000;
        let chorus = ModulationParams::chorus();
        let chain = EffectChain::new()
            .with(Effect::Delay(DelayParams::new(0.1, 0.3, 0.5).unwrap()))
            .with(Effect::Chorus(chorus))
            .with(Effect::Reverb(ReverbParams::new(0.2, 0.2).unwrap().with_seed(3)));

        let buffer = sine(500, sample_rate);
        let out = chain.render(&buffer).unwrap();

        assert_eq!(chain.expected_frames(500, sample_rate), 500 + 300 + chorus.tail_frames(sample_rate) + 200);
        assert_eq!(out.frame_count(), chain.expected_frames(500, sample_rate));
    }

    #[test]
    fn test_validation_runs_before_processing() {
        let mut chain = EffectChain::new();
        chain
            .push(Effect::Gain { db: 6.0 })
            .push(Effect::Delay(DelayParams {
                delay_time: 5.0,
                feedback: 0.3,
                mix: 0.5,
            }));

        let err = chain.render(&sine(100, 8000)).unwrap_err();
        assert!(matches!(
            err,
            AudioError::InvalidParameter {
                name: "delay_time",
                ..
            }
        ));
        assert!(Effect::Normalize { level: 0.0 }.validate().is_err());
        assert!(Effect::Fade {
            fade_in: -1.0,
            fade_out: 0.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_stage_failure_aborts_render() {
        // 5 kHz is above Nyquist at 8 kHz; only detectable at render time
        let chain = EffectChain::new()
            .with(Effect::Gain { db: -3.0 })
            .with(Effect::LowPass(PassFilter::new(5000.0).unwrap()));
        assert!(chain.render(&sine(100, 8000)).is_err());
    }

    #[test]
    fn test_effect_serde_round_trip() {
        let chain = EffectChain::new()
            .with(Effect::Fade {
                fade_in: 0.5,
                fade_out: 1.0,
            })
            .with(Effect::Distortion(DistortionParams::new(0.3).unwrap()));
        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.contains("\"type\":\"fade\""));
        let back: EffectChain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }

    #[test]
    fn test_session_counts_renders() {
        let session = RenderSession::new();
        let chain = EffectChain::new().with(Effect::Gain { db: 0.0 });
        let buffer = sine(64, 8000);

        assert_eq!(session.render(&chain, &buffer).unwrap(), buffer);
        assert_eq!(session.render_count(), 1);
        assert!(!session.is_rendering());

        let bad = EffectChain::new().with(Effect::Normalize { level: -1.0 });
        assert!(session.render(&bad, &buffer).is_err());
        assert_eq!(session.render_count(), 1);
    }

    #[test]
    fn test_session_serializes_renders() {
        let session = Arc::new(RenderSession::new());
        let chain = EffectChain::new().with(Effect::Compressor(CompressorParams::default()));
        let buffer = sine(2000, 8000);

        // Hold the gate: a render on another thread must wait for it
        let guard = session.gate.lock();
        let handle = {
            let session = Arc::clone(&session);
            let chain = chain.clone();
            let buffer = buffer.clone();
            thread::spawn(move || session.render(&chain, &buffer))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(session.render_count(), 0);
        drop(guard);

        let out = handle.join().unwrap().unwrap();
        assert_eq!(session.render_count(), 1);
        assert_eq!(out.frame_count(), 2000);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                let chain = chain.clone();
                let buffer = buffer.clone();
                thread::spawn(move || session.render(&chain, &buffer).unwrap())
            })
            .collect();
        let outputs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(session.render_count(), 5);
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    }
}
