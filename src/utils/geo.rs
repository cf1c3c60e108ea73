use crate::error::{AppError, Result};

/// 地球平均半径 (km)
const EARTH_RADIUS_KM: f64 = 6371.0;

/// 大圆距离 (haversine), 单位 km
/// 服务区域纬度跨度足够大, 平面近似在 1-50km 半径边界会有明显误差
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// 校验坐标: 必须有限且在合法的经纬度范围内
pub fn validate_coordinates(lat: f64, lng: f64) -> Result<()> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(AppError::validation("Coordinates must be finite numbers"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::validation("Latitude must be between -90 and 90"));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(AppError::validation("Longitude must be between -180 and 180"));
    }
    Ok(())
}
