use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, ServiceError},
    geo::{Coordinates, haversine_km},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TourStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPoint {
    pub id: u64,
    pub tour_id: u64,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyPoint {
    /// Stored key points were validated on the way in.
    pub fn position(&self) -> Coordinates {
        Coordinates::trusted(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct NewKeyPoint {
    pub name: String,
    pub description: String,
    pub position: Coordinates,
    pub image: Option<String>,
    pub address: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct KeyPointPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<Coordinates>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub order: Option<i32>,
}

impl KeyPointPatch {
    pub fn apply_to(self, key_point: &mut KeyPoint, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            key_point.name = name;
        }
        if let Some(description) = self.description {
            key_point.description = description;
        }
        if let Some(position) = self.position {
            key_point.latitude = position.lat();
            key_point.longitude = position.lng();
        }
        if let Some(image) = self.image {
            key_point.image = Some(image);
        }
        if let Some(address) = self.address {
            key_point.address = Some(address);
        }
        if let Some(order) = self.order {
            key_point.order = order;
        }
        key_point.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Walking,
    Bicycle,
    Car,
}

/// How long the tour takes with one means of transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDuration {
    pub id: u64,
    pub tour_id: u64,
    pub transport_type: TransportType,
    pub duration_min: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewDuration {
    pub transport_type: TransportType,
    pub duration_min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: u64,
    pub author_id: u64,
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub status: TourStatus,
    pub price: f64,
    pub distance_km: f64,
    pub key_points: Vec<KeyPoint>,
    /// At most one entry per transport type.
    #[serde(default)]
    pub durations: Vec<TourDuration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTour {
    pub author_id: u64,
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub price: f64,
    pub key_points: Vec<NewKeyPoint>,
}

impl Tour {
    pub fn key_point_ids(&self) -> Vec<u64> {
        self.key_points.iter().map(|kp| kp.id).collect()
    }

    pub fn has_key_point(&self, key_point_id: u64) -> bool {
        self.key_points.iter().any(|kp| kp.id == key_point_id)
    }

    pub fn next_order(&self) -> i32 {
        self.key_points.iter().map(|kp| kp.order).max().unwrap_or(0) + 1
    }

    /// Restores route order and the cached route length after a key point change.
    pub fn reindex(&mut self, now: DateTime<Utc>) {
        self.key_points.sort_by_key(|kp| (kp.order, kp.id));
        self.distance_km = route_distance_km(&self.key_points);
        self.updated_at = now;
    }

    pub fn duration_for(&self, transport_type: TransportType) -> Option<&TourDuration> {
        self.durations
            .iter()
            .find(|duration| duration.transport_type == transport_type)
    }

    /// Replaces the duration of the same transport type, if any.
    pub fn set_duration(&mut self, duration: TourDuration, now: DateTime<Utc>) {
        self.durations
            .retain(|existing| existing.transport_type != duration.transport_type);
        self.durations.push(duration);
        self.durations.sort_by_key(|duration| duration.transport_type);
        self.updated_at = now;
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TourStatus::Draft {
            return Err(ServiceError::invalid_state(
                "only draft tours can be published",
            ));
        }
        if self.name.trim().is_empty() || self.description.trim().is_empty() {
            return Err(ServiceError::invalid_state(
                "tour must have name and description",
            ));
        }
        if self.key_points.len() < 2 {
            return Err(ServiceError::invalid_state(
                "tour must have at least 2 key points",
            ));
        }
        self.status = TourStatus::Published;
        self.updated_at = now;
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TourStatus::Published {
            return Err(ServiceError::invalid_state(
                "only published tours can be archived",
            ));
        }
        self.status = TourStatus::Archived;
        self.updated_at = now;
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TourStatus::Archived {
            return Err(ServiceError::invalid_state(
                "only archived tours can be activated",
            ));
        }
        self.status = TourStatus::Published;
        self.updated_at = now;
        Ok(())
    }

    /// What a viewer who has not bought the tour gets to see.
    pub fn into_preview(mut self) -> Self {
        self.key_points.truncate(1);
        self
    }
}

/// Length of the walk through `key_points` in their stored order, in kilometers.
pub fn route_distance_km(key_points: &[KeyPoint]) -> f64 {
    key_points
        .windows(2)
        .map(|pair| haversine_km(&pair[0].position(), &pair[1].position()))
        .sum()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn key_point(id: u64, tour_id: u64, order: i32, lat: f64, lng: f64) -> KeyPoint {
        let now = Utc::now();
        KeyPoint {
            id,
            tour_id,
            name: format!("kp-{id}"),
            description: String::new(),
            latitude: lat,
            longitude: lng,
            image: None,
            address: None,
            order,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tour(id: u64, key_points: Vec<KeyPoint>) -> Tour {
        let now = Utc::now();
        let mut tour = Tour {
            id,
            author_id: 1,
            name: "Old town".to_string(),
            description: "Walk through the fortress".to_string(),
            difficulty: "easy".to_string(),
            tags: vec![],
            status: TourStatus::Draft,
            price: 10.0,
            distance_km: 0.0,
            key_points,
            durations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tour.reindex(now);
        tour
    }
}
