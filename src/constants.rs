/// Constants used by the search client and request envelope.
pub mod api {
    /// Response envelope code indicating a successful request.
    pub const SUCCESS_CODE: &str = "10000";
    /// Default search endpoint path appended to the configured base URL.
    pub const SEARCH_PATH: &str = "/api/seller/searchStore";
    /// Default payload field carrying the record identifier.
    pub const DEFAULT_ID_FIELD: &str = "sellerId";
    /// Default base URL of the search service.
    pub const DEFAULT_BASE_URL: &str = "https://fm.mall.yep.co.za";
    /// Default `Origin` header value the service expects.
    pub const DEFAULT_ORIGIN: &str = "https://mall.yep.co.za";
    /// Default `Referer` header value the service expects.
    pub const DEFAULT_REFERER: &str = "https://mall.yep.co.za/";
    /// Default browser-like user agent string.
    pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
}

/// Constants used by checkpoint artifacts and their layout on disk.
pub mod checkpoint {
    /// Filename of the deduplicated raw-record array (the resume source).
    pub const RECORDS_FILENAME: &str = "records.json";
    /// Filename of the flat tabular projection.
    pub const TABLE_FILENAME: &str = "records.csv";
    /// Filename of the snapshot metadata envelope.
    pub const META_FILENAME: &str = "progress_meta.json";
    /// Extension used for the temporary sibling during atomic writes.
    pub const TMP_EXTENSION: &str = "tmp";
    /// Fixed column projection for the tabular export, in output order.
    pub const TABLE_COLUMNS: &[&str] = &[
        "sellerId",
        "storeName",
        "primaryContactNumber",
        "alternativeContactNumber",
        "storeAddress",
        "storeAddressLatitude",
        "storeAddressLongitude",
        "premiumSeller",
        "subscriptionStatus",
        "serviceRange",
        "storeLogo",
    ];
}

/// Constants used by scheduler progress reporting.
pub mod progress {
    /// Minimum interval between periodic progress log lines, in milliseconds.
    pub const REPORT_EVERY_MS: u64 = 5_000;
}
