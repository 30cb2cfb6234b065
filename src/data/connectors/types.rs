/// OHLCV fields a price file must provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredColumn {
    Timestamp,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl RequiredColumn {
    pub const ALL: [RequiredColumn; 6] = [
        RequiredColumn::Timestamp,
        RequiredColumn::Open,
        RequiredColumn::High,
        RequiredColumn::Low,
        RequiredColumn::Close,
        RequiredColumn::Volume,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequiredColumn::Timestamp => "timestamp",
            RequiredColumn::Open => "open",
            RequiredColumn::High => "high",
            RequiredColumn::Low => "low",
            RequiredColumn::Close => "close",
            RequiredColumn::Volume => "volume",
        }
    }

    /// Accepted header names in order of preference, matched case-insensitively
    pub fn headers(self) -> &'static [&'static str] {
        match self {
            RequiredColumn::Timestamp => &["timestamp", "date", "datetime", "time"],
            RequiredColumn::Open => &["open", "o"],
            RequiredColumn::High => &["high", "h"],
            RequiredColumn::Low => &["low", "l"],
            RequiredColumn::Close => &["close", "adj close", "adj_close", "c"],
            RequiredColumn::Volume => &["volume", "vol", "v"],
        }
    }
}
