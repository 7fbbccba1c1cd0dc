// Narration: text assembly, speech normalization, and the audio cache

pub mod cache;
pub mod text;

pub use cache::{DescribeConfig, DescriptionAudio, DescriptionCache};
pub use text::{
    alert_narration, all_clear_narration, current_alerts_narration, describe_selection,
    normalize_for_speech, system_status_narration, Selection,
};
