//! Archived candles.
//!
//! The archive answers with the candles under a key named after the
//! requested layout: `OHLCV` for bars, `MPV` for volume-at-price profiles.

use std::sync::LazyLock;

use crate::domain::entry::Pipeline;
use crate::domain::payloads::CandleKind;
use crate::domain::schema::{Field, Rule, Schema};

/// Message when the archive holds no candles for the range.
pub const CANDLES_MISSING: &str = "Candles are missing";

/// Parallel arrays zipped into `Levels`.
pub const MPV_LEVEL_COLUMNS: &[(&str, &str)] = &[
    ("Prices", "Price"),
    ("Volumes", "Volume"),
    ("AskVolumes", "AskVolume"),
];

/// Open/high/low/close/volume bar.
pub static OHLCV: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Real(Field::described("Open", "Opening price")),
        Rule::Real(Field::described("Close", "Closing price")),
        Rule::Real(Field::described("Low", "Lowest price")),
        Rule::Real(Field::described("High", "Highest price")),
        Rule::Whole(Field::described("Volume", "Traded volume")),
        Rule::Whole(Field::described("VolumeAsk", "Volume traded at the ask")),
        Rule::Whole(Field::described("OpenInt", "Open interest")),
        Rule::Text(Field::described("DT", "Candle start time")),
    ])
});

/// Volume-at-price profile.
pub static MPV: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Real(Field::described("Open", "Opening price")),
        Rule::Real(Field::described("Close", "Closing price")),
        Rule::Text(Field::described("DT", "Candle start time")),
        Rule::Zip {
            target: "Levels",
            columns: MPV_LEVEL_COLUMNS,
        },
    ])
});

/// Schema for a candle layout.
#[must_use]
pub fn schema(kind: CandleKind) -> &'static Schema {
    match kind {
        CandleKind::Ohlcv => &OHLCV,
        CandleKind::Mpv => &MPV,
    }
}

/// `{"OHLCV"|"MPV": [...]}` → `{"candles": [...]}`.
#[must_use]
pub fn candles(kind: CandleKind) -> Pipeline {
    Pipeline::new()
        .extract_array(kind.payload_key())
        .require_non_empty(CANDLES_MISSING)
        .map(schema(kind))
        .wrap("candles")
}
