/// Stable record identifier assigned by the upstream search service.
/// Example: `1653791642477690881`
pub type RecordId = String;
/// Human-readable seed region name used in logs and reports.
/// Examples: `Johannesburg`, `Cape Town`
pub type RegionName = String;
/// Deterministic cell identity code used for logging and reports.
/// Example: `L1[-26.1750,28.0625]`
pub type CellCode = String;
