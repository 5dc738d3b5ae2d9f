//! BDD step definitions for reference data and readings

use chrono::{DateTime, Utc};
use cucumber::given;

use roomwatch::model::{Building, Reading, Room, Sensor};

use crate::world::RoomwatchWorld;

pub fn parse_time(s: &str) -> DateTime<Utc> {
    s.parse()
        .unwrap_or_else(|e| panic!("Invalid timestamp '{}': {}", s, e))
}

#[given(expr = "building {string} named {string}")]
fn building(world: &mut RoomwatchWorld, id: String, name: String) {
    world.seed.buildings.push(Building { id, name });
}

#[given(expr = "room {string} in building {string}")]
fn room(world: &mut RoomwatchWorld, id: String, building_id: String) {
    world.seed.rooms.push(Room {
        id,
        building_id,
        capacity: 0,
        room_type: String::new(),
    });
}

#[given(expr = "sensor {string} of type {string} measuring {string} in room {string}")]
fn sensor(
    world: &mut RoomwatchWorld,
    id: String,
    sensor_type: String,
    unit: String,
    room_id: String,
) {
    world.seed.sensors.push(Sensor {
        id,
        sensor_type,
        unit,
        room_id,
    });
}

#[given(expr = "reading {float} from {string} at {string}")]
fn reading(world: &mut RoomwatchWorld, value: f64, sensor_id: String, timestamp: String) {
    world.seed.measurements.push(Reading {
        sensor_id,
        value,
        timestamp: parse_time(&timestamp),
        unit: None,
    });
}
