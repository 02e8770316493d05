//! Geographic primitives used for driver matching.
//!
//! Store locations arrive from the directory in several shapes. All of them
//! are normalised into [`Coordinates`] by [`Coordinates::from_json`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mean Earth radius used by the great-circle formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors produced while reading coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
	#[error("Coordinates are not in a recognised format")]
	UnrecognisedFormat,
	#[error("Coordinate component is not a number: {0}")]
	NotANumber(String),
	#[error("Latitude {0} out of range [-90, 90]")]
	LatitudeOutOfRange(f64),
	#[error("Longitude {0} out of range [-180, 180]")]
	LongitudeOutOfRange(f64),
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
	pub lat: f64,
	pub lng: f64,
}

impl Coordinates {
	/// Creates a validated pair.
	pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
		if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
			return Err(CoordinateError::LatitudeOutOfRange(lat));
		}
		if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
			return Err(CoordinateError::LongitudeOutOfRange(lng));
		}
		Ok(Self { lat, lng })
	}

	/// Reads coordinates from any of the accepted JSON shapes:
	///
	/// - `[lat, lng]`
	/// - `"lat,lng"`
	/// - `{"latitude": .., "longitude": ..}` or `{"lat": .., "lng": ..}`
	///
	/// Components may be numbers or numeric strings.
	pub fn from_json(value: &serde_json::Value) -> Result<Self, CoordinateError> {
		use serde_json::Value;

		match value {
			Value::Array(parts) if parts.len() == 2 => {
				Self::new(component(&parts[0])?, component(&parts[1])?)
			},
			Value::String(s) => s.parse(),
			Value::Object(map) => {
				let lat = map
					.get("latitude")
					.or_else(|| map.get("lat"))
					.ok_or(CoordinateError::UnrecognisedFormat)?;
				let lng = map
					.get("longitude")
					.or_else(|| map.get("lng"))
					.ok_or(CoordinateError::UnrecognisedFormat)?;
				Self::new(component(lat)?, component(lng)?)
			},
			_ => Err(CoordinateError::UnrecognisedFormat),
		}
	}

	/// Great-circle distance in kilometres (haversine).
	pub fn distance_km(&self, other: &Coordinates) -> f64 {
		let d_lat = (other.lat - self.lat).to_radians();
		let d_lng = (other.lng - self.lng).to_radians();
		let a = (d_lat / 2.0).sin().powi(2)
			+ self.lat.to_radians().cos()
				* other.lat.to_radians().cos()
				* (d_lng / 2.0).sin().powi(2);
		let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
		EARTH_RADIUS_KM * c
	}
}

impl std::str::FromStr for Coordinates {
	type Err = CoordinateError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (lat, lng) = s
			.split_once(',')
			.ok_or(CoordinateError::UnrecognisedFormat)?;
		Self::new(parse_number(lat)?, parse_number(lng)?)
	}
}

impl fmt::Display for Coordinates {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{},{}", self.lat, self.lng)
	}
}

fn component(value: &serde_json::Value) -> Result<f64, CoordinateError> {
	match value {
		serde_json::Value::Number(n) => n
			.as_f64()
			.ok_or_else(|| CoordinateError::NotANumber(n.to_string())),
		serde_json::Value::String(s) => parse_number(s),
		other => Err(CoordinateError::NotANumber(other.to_string())),
	}
}

fn parse_number(s: &str) -> Result<f64, CoordinateError> {
	s.trim()
		.parse::<f64>()
		.map_err(|_| CoordinateError::NotANumber(s.trim().to_string()))
}
