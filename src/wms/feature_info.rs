/// GetFeatureInfo text payload parsing
///
/// GeoMet answers `INFO_FORMAT=text/plain` queries with a small report such as:
///
/// ```text
/// GetFeatureInfo results:
///
/// Layer 'GDPS.ETA_TT'
///   Feature 0:
///     x = '-135.05'
///     y = '60.72'
///     value_0 = '-3.4567'
/// ```
use once_cell::sync::Lazy;
use regex::Regex;

static VALUE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"value_0\s*=\s*['"]?\s*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)"#).ok()
});

/// Pull the first `value_0 = <number>` out of a feature-info body
///
/// Returns `None` when the body has no such line or the number does not parse;
/// the sampler records that timestep as `0.0`.
///
/// # Examples
///
/// ```
/// use geomet_etl::wms::extract_pixel_value;
///
/// assert_eq!(extract_pixel_value("    value_0 = '12.5'"), Some(12.5));
/// assert_eq!(extract_pixel_value("Search returned no results."), None);
/// ```
pub fn extract_pixel_value(body: &str) -> Option<f64> {
    VALUE_RE
        .as_ref()?
        .captures(body)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
