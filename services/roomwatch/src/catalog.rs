//! Snapshot of the building / room / sensor reference set

use std::collections::BTreeMap;

use crate::model::{Building, Room, Sensor};
use crate::{Result, RoomwatchError};

/// Immutable view of the reference data.
///
/// Maps are keyed by id, so every listing comes out ordered by id (which is
/// also the display name for rooms and sensors).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    buildings: BTreeMap<String, Building>,
    rooms: BTreeMap<String, Room>,
    sensors: BTreeMap<String, Sensor>,
}

impl Catalog {
    /// Build a catalog, rejecting rooms or sensors that point at missing parents
    pub fn new(buildings: Vec<Building>, rooms: Vec<Room>, sensors: Vec<Sensor>) -> Result<Self> {
        let buildings: BTreeMap<_, _> = buildings.into_iter().map(|b| (b.id.clone(), b)).collect();

        let mut room_map = BTreeMap::new();
        for room in rooms {
            if !buildings.contains_key(&room.building_id) {
                return Err(RoomwatchError::Config(format!(
                    "room '{}' references unknown building '{}'",
                    room.id, room.building_id
                )));
            }
            room_map.insert(room.id.clone(), room);
        }

        let mut sensor_map = BTreeMap::new();
        for sensor in sensors {
            if !room_map.contains_key(&sensor.room_id) {
                return Err(RoomwatchError::Config(format!(
                    "sensor '{}' references unknown room '{}'",
                    sensor.id, sensor.room_id
                )));
            }
            sensor_map.insert(sensor.id.clone(), sensor);
        }

        Ok(Self {
            buildings,
            rooms: room_map,
            sensors: sensor_map,
        })
    }

    pub fn building(&self, id: &str) -> Option<&Building> {
        self.buildings.get(id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.sensors.get(id)
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        self.sensors.keys().cloned().collect()
    }

    /// Rooms of a building, ordered by room id
    pub fn rooms_in(&self, building_id: &str) -> Vec<&Room> {
        self.rooms
            .values()
            .filter(|r| r.building_id == building_id)
            .collect()
    }

    /// Sensors physically located in a building, ordered by sensor id
    pub fn sensors_in(&self, building_id: &str) -> Vec<&Sensor> {
        self.sensors
            .values()
            .filter(|s| {
                self.rooms
                    .get(&s.room_id)
                    .is_some_and(|r| r.building_id == building_id)
            })
            .collect()
    }

    /// Follow a sensor up to its room and building
    pub fn locate(&self, sensor_id: &str) -> Option<(&Sensor, &Room, &Building)> {
        let sensor = self.sensors.get(sensor_id)?;
        let room = self.rooms.get(&sensor.room_id)?;
        let building = self.buildings.get(&room.building_id)?;
        Some((sensor, room, building))
    }
}
