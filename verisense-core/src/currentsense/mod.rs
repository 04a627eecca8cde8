//! Current-sense signature verification
//!
//! A sensor's supply current while it runs is a signature of the part and
//! of its health. Periodic loads show a repeating waveform whose frequency,
//! duty cycle and relative draw are stable; aperiodic loads are summarized
//! by their average active and idle current.
//!
//! - [`template`]: learned signatures and their store
//! - [`features`]: candidate frequencies and feature extraction
//! - [`drift`]: how far a live cycle moved from the template
//! - [`acquisition`]: producer/consumer handshake for raw buffers (std)
//! - [`engine`]: per-sensor mode machine tying the above together (std)

pub mod drift;
pub mod features;
pub mod template;

#[cfg(feature = "std")]
pub mod acquisition;
#[cfg(feature = "std")]
pub mod engine;

pub use drift::{evaluate_status, template_drift, SensorStatus, StatusReport};
pub use features::{candidate_sampling_frequencies, RawSignatureBuffer};
pub use template::{
    AverageCurrent, FeatureVector, NonRepeatingTemplate, OffsetCurrent, RepeatingTemplate, SignatureDatabase,
    SignatureTemplate, TemplateKind,
};

#[cfg(feature = "std")]
pub use acquisition::{
    fill_from_source, AcquisitionPlan, AcquisitionRequest, Collection, CollectedSignatures, RawSignatureReader,
    SignatureProducer,
};
#[cfg(feature = "std")]
pub use engine::{CurrentSenseSensor, DatabaseReport, Mode};
