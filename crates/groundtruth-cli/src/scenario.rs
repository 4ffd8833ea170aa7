//! Scripted traffic used to drive the sensor without a game engine.
//!
//! An ego vehicle carrying the sensor drives down a straight multi-lane road
//! (engine basis: x right, y up, z forward).  Other vehicles share the road,
//! some driven by an AI agent that reports its own velocity and some moved
//! by the physics body alone.  Every physics step the spherical sensing
//! volume around the sensor raises one [`ObjectEntered`] per vehicle inside
//! it, for as long as the vehicle stays inside.

use groundtruth_perception::{
    MotionSources, ObjectEntered, ObjectObservation, Pose3D, Quaternion, RigidBodyMotion, Vec3,
};
use groundtruth_types::ObjectKey;

use crate::config::ScenarioConfig;

const LANE_WIDTH_M: f32 = 3.5;
const EGO_SPEED_MPS: f32 = 12.0;
/// Vehicles further than this from the ego are respawned on the far side.
const ROAD_HALF_LENGTH_M: f32 = 120.0;
/// Engine-frame extent of a passenger car: width, height, length.
const CAR_SIZE: Vec3 = Vec3 { x: 1.9, y: 1.5, z: 4.5 };

/// How a vehicle reports its motion to the physics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    /// Navigation agent with a commanded velocity.
    Agent,
    /// Plain rigid body.
    RigidBody,
}

/// One non-ego vehicle on the road.
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub key: ObjectKey,
    pub lane: i32,
    pub z: f32,
    /// Signed speed along the road; negative is oncoming traffic.
    pub speed: f32,
    pub drive: Drive,
}

impl SimVehicle {
    fn yaw_degrees(&self) -> f32 {
        if self.speed < 0.0 { 180.0 } else { 0.0 }
    }

    pub fn pose(&self) -> Pose3D {
        Pose3D::new(
            Vec3::new(self.lane as f32 * LANE_WIDTH_M, CAR_SIZE.y * 0.5, self.z),
            Quaternion::from_euler(0.0, self.yaw_degrees(), 0.0),
        )
    }

    /// What the physics engine would expose about this vehicle.
    pub fn observation(&self) -> ObjectObservation {
        let pose = self.pose();
        let forward = pose.rotation.forward();
        let velocity = Vec3::new(0.0, 0.0, self.speed);
        let motion = match self.drive {
            Drive::Agent => MotionSources {
                agent_velocity: Some(velocity),
                rigid_body: None,
            },
            Drive::RigidBody => MotionSources {
                agent_velocity: None,
                rigid_body: Some(RigidBodyMotion {
                    linear: velocity,
                    angular: Vec3::zero(),
                }),
            },
        };
        ObjectObservation {
            pose,
            size: CAR_SIZE,
            forward,
            motion,
        }
    }
}

/// Spherical trigger volume centred on the sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensingVolume {
    pub radius: f32,
}

impl SensingVolume {
    pub fn contains(&self, centre: Vec3, point: Vec3) -> bool {
        point.sub(centre).length() <= self.radius
    }
}

/// The whole scripted world.
#[derive(Debug)]
pub struct TrafficScenario {
    ego_z: f32,
    mount: Pose3D,
    volume: SensingVolume,
    vehicles: Vec<SimVehicle>,
    time: f64,
}

impl TrafficScenario {
    /// Lay out `config.vehicles` cars deterministically across four lanes.
    pub fn new(config: &ScenarioConfig) -> Self {
        let vehicles = (0..config.vehicles)
            .map(|i| {
                let lane = (i % 4) as i32 - 1;
                let oncoming = lane < 0;
                let spacing = 2.0 * ROAD_HALF_LENGTH_M / config.vehicles.max(1) as f32;
                let base_speed = 8.0 + (i % 3) as f32 * 4.0;
                SimVehicle {
                    key: ObjectKey(i as u64 + 1),
                    lane,
                    z: -ROAD_HALF_LENGTH_M + spacing * i as f32,
                    speed: if oncoming { -base_speed } else { base_speed },
                    drive: if i % 2 == 0 { Drive::Agent } else { Drive::RigidBody },
                }
            })
            .collect();

        Self {
            ego_z: 0.0,
            mount: Pose3D::new(
                Vec3::new(0.0, config.mount_height_m, 0.0),
                Quaternion::identity(),
            ),
            volume: SensingVolume {
                radius: config.sensing_radius_m,
            },
            vehicles,
            time: 0.0,
        }
    }

    /// Simulated seconds elapsed.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn vehicles(&self) -> &[SimVehicle] {
        &self.vehicles
    }

    pub fn ego_pose(&self) -> Pose3D {
        Pose3D::new(Vec3::new(0.0, 0.0, self.ego_z), Quaternion::identity())
    }

    /// World pose of the sensor: the ego pose composed with the mount.
    pub fn sensor_pose(&self) -> Pose3D {
        self.ego_pose().compose(self.mount)
    }

    /// Advance the world by `dt` seconds and report every vehicle inside the
    /// sensing volume.
    pub fn step(&mut self, dt: f64) -> Vec<ObjectEntered> {
        self.time += dt;
        let dt = dt as f32;
        self.ego_z += EGO_SPEED_MPS * dt;

        for vehicle in &mut self.vehicles {
            vehicle.z += vehicle.speed * dt;
            let offset = vehicle.z - self.ego_z;
            if offset > ROAD_HALF_LENGTH_M {
                vehicle.z -= 2.0 * ROAD_HALF_LENGTH_M;
            } else if offset < -ROAD_HALF_LENGTH_M {
                vehicle.z += 2.0 * ROAD_HALF_LENGTH_M;
            }
        }

        self.in_range()
    }

    /// Vehicles currently inside the sensing volume.
    pub fn in_range(&self) -> Vec<ObjectEntered> {
        let centre = self.sensor_pose().position;
        self.vehicles
            .iter()
            .filter(|v| self.volume.contains(centre, v.pose().position))
            .map(|v| ObjectEntered {
                key: v.key,
                observation: v.observation(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(vehicles: usize) -> TrafficScenario {
        TrafficScenario::new(&ScenarioConfig {
            vehicles,
            ..ScenarioConfig::default()
        })
    }

    #[test]
    fn sensor_sits_on_the_mount() {
        let s = scenario(0);
        let p = s.sensor_pose().position;
        assert_eq!((p.x, p.y, p.z), (0.0, 1.8, 0.0));
    }

    #[test]
    fn volume_is_a_sphere() {
        let v = SensingVolume { radius: 5.0 };
        assert!(v.contains(Vec3::zero(), Vec3::new(3.0, 0.0, 4.0)));
        assert!(!v.contains(Vec3::zero(), Vec3::new(3.0, 0.1, 4.0)));
    }

    #[test]
    fn vehicles_inside_are_reported_every_step() {
        let mut s = scenario(0);
        s.vehicles.push(SimVehicle {
            key: ObjectKey(42),
            lane: 0,
            z: 10.0,
            speed: EGO_SPEED_MPS,
            drive: Drive::Agent,
        });

        for _ in 0..3 {
            let events = s.step(0.02);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].key, ObjectKey(42));
        }
    }

    #[test]
    fn distant_vehicles_are_not_reported() {
        let mut s = scenario(0);
        s.vehicles.push(SimVehicle {
            key: ObjectKey(1),
            lane: 2,
            z: 100.0,
            speed: EGO_SPEED_MPS,
            drive: Drive::RigidBody,
        });
        assert!(s.step(0.02).is_empty());
    }

    #[test]
    fn oncoming_vehicle_faces_backwards() {
        let v = SimVehicle {
            key: ObjectKey(1),
            lane: -1,
            z: 0.0,
            speed: -10.0,
            drive: Drive::RigidBody,
        };
        let obs = v.observation();
        assert!((obs.forward.z + 1.0).abs() < 1e-5);
        // Moving along its own heading: positive forward speed.
        assert!((obs.motion.linear_velocity().dot(obs.forward) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn drive_decides_which_motion_source_is_set() {
        let s = scenario(2);
        let agent = s.vehicles()[0].observation();
        let body = s.vehicles()[1].observation();
        assert!(agent.motion.agent_velocity.is_some() && agent.motion.rigid_body.is_none());
        assert!(body.motion.agent_velocity.is_none() && body.motion.rigid_body.is_some());
    }

    #[test]
    fn traffic_stays_around_the_ego() {
        let mut s = scenario(8);
        for _ in 0..5_000 {
            s.step(0.02);
        }
        let ego = s.ego_pose().position.z;
        for v in s.vehicles() {
            assert!((v.z - ego).abs() <= ROAD_HALF_LENGTH_M + 1.0, "{v:?} drifted off");
        }
        assert!((s.time() - 100.0).abs() < 1e-6);
    }
}
