use serde::{Deserialize, Serialize};

use crate::types::Geodetic;

/// One flight-plan waypoint. `height` falls back to the template's global
/// height when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
    #[serde(default, alias = "alt", alias = "elevation")]
    pub altitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Waypoint {
        Waypoint {
            latitude,
            longitude,
            altitude,
            height: None,
            actions: Vec::new(),
        }
    }

    pub fn from_geodetic(geo: &Geodetic) -> Waypoint {
        Waypoint::new(geo.latitude, geo.longitude, geo.altitude)
    }

    pub fn with_height(mut self, height: f64) -> Waypoint {
        self.height = Some(height);
        self
    }

    pub fn with_action(mut self, action: Action) -> Waypoint {
        self.actions.push(action);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum YawPathMode {
    Clockwise,
    #[default]
    CounterClockwise,
}

impl YawPathMode {
    fn as_str(self) -> &'static str {
        match self {
            YawPathMode::Clockwise => "clockwise",
            YawPathMode::CounterClockwise => "counterClockwise",
        }
    }
}

fn default_yaw_base() -> String {
    "north".to_string()
}

fn default_rotate_mode() -> String {
    "absoluteAngle".to_string()
}

fn default_true() -> bool {
    true
}

fn flag(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}

/// Actuator command run when the aircraft reaches a waypoint.
///
/// JSON form: `{"type": "hover", "params": {"hoverTime": 5}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    RotateYaw {
        aircraft_heading: f64,
        #[serde(default)]
        aircraft_path_mode: YawPathMode,
    },
    #[serde(rename_all = "camelCase")]
    GimbalRotate {
        #[serde(default)]
        pitch_angle: Option<f64>,
        #[serde(default)]
        roll_angle: Option<f64>,
        #[serde(default)]
        yaw_angle: Option<f64>,
        #[serde(default = "default_yaw_base")]
        yaw_base: String,
        #[serde(default = "default_rotate_mode")]
        rotate_mode: String,
        #[serde(default)]
        payload_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    Zoom {
        focal_length: f64,
        #[serde(default)]
        use_focal_factor: bool,
        #[serde(default)]
        payload_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    TakePhoto {
        #[serde(default)]
        payload_index: u32,
        #[serde(default = "default_true")]
        use_global_payload_lens_index: bool,
    },
    #[serde(rename_all = "camelCase")]
    StartRecord {
        #[serde(default)]
        payload_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    StopRecord {
        #[serde(default)]
        payload_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    Hover { hover_time: f64 },
}

impl Action {
    pub fn rotate_yaw(heading: f64, path_mode: YawPathMode) -> Action {
        Action::RotateYaw {
            aircraft_heading: heading,
            aircraft_path_mode: path_mode,
        }
    }

    /// Absolute gimbal rotation; axes left as `None` stay disabled.
    pub fn gimbal_rotate(pitch: Option<f64>, roll: Option<f64>, yaw: Option<f64>) -> Action {
        Action::GimbalRotate {
            pitch_angle: pitch,
            roll_angle: roll,
            yaw_angle: yaw,
            yaw_base: default_yaw_base(),
            rotate_mode: default_rotate_mode(),
            payload_index: 0,
        }
    }

    pub fn zoom(focal_length: f64, use_focal_factor: bool) -> Action {
        Action::Zoom {
            focal_length,
            use_focal_factor,
            payload_index: 0,
        }
    }

    pub fn take_photo() -> Action {
        Action::TakePhoto {
            payload_index: 0,
            use_global_payload_lens_index: true,
        }
    }

    pub fn start_record() -> Action {
        Action::StartRecord { payload_index: 0 }
    }

    pub fn stop_record() -> Action {
        Action::StopRecord { payload_index: 0 }
    }

    pub fn hover(seconds: f64) -> Action {
        Action::Hover {
            hover_time: seconds,
        }
    }

    /// Value of `wpml:actionActuatorFunc`.
    pub fn actuator_func(&self) -> &'static str {
        match self {
            Action::RotateYaw { .. } => "rotateYaw",
            Action::GimbalRotate { .. } => "gimbalRotate",
            Action::Zoom { .. } => "zoom",
            Action::TakePhoto { .. } => "takePhoto",
            Action::StartRecord { .. } => "startRecord",
            Action::StopRecord { .. } => "stopRecord",
            Action::Hover { .. } => "hover",
        }
    }

    /// Children of `wpml:actionActuatorFuncParam`, in document order.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::RotateYaw {
                aircraft_heading,
                aircraft_path_mode,
            } => vec![
                ("aircraftHeading", aircraft_heading.to_string()),
                ("aircraftPathMode", aircraft_path_mode.as_str().to_string()),
            ],
            Action::GimbalRotate {
                pitch_angle,
                roll_angle,
                yaw_angle,
                yaw_base,
                rotate_mode,
                payload_index,
            } => {
                let mut params = vec![
                    ("gimbalHeadingYawBase", yaw_base.clone()),
                    ("gimbalRotateMode", rotate_mode.clone()),
                    ("payloadPositionIndex", payload_index.to_string()),
                    ("gimbalRotateTimeEnable", flag(false)),
                    ("gimbalRotateTime", "0".to_string()),
                ];
                let axes = [
                    ("gimbalPitchRotateEnable", "gimbalPitchRotateAngle", pitch_angle),
                    ("gimbalRollRotateEnable", "gimbalRollRotateAngle", roll_angle),
                    ("gimbalYawRotateEnable", "gimbalYawRotateAngle", yaw_angle),
                ];
                for (enable, angle_key, angle) in axes {
                    params.push((enable, flag(angle.is_some())));
                    if let Some(a) = angle {
                        params.push((angle_key, a.to_string()));
                    }
                }
                params
            }
            Action::Zoom {
                focal_length,
                use_focal_factor,
                payload_index,
            } => vec![
                ("focalLength", focal_length.to_string()),
                ("isUseFocalFactor", flag(*use_focal_factor)),
                ("payloadPositionIndex", payload_index.to_string()),
            ],
            Action::TakePhoto {
                payload_index,
                use_global_payload_lens_index,
            } => vec![
                ("payloadPositionIndex", payload_index.to_string()),
                ("useGlobalPayloadLensIndex", flag(*use_global_payload_lens_index)),
            ],
            Action::StartRecord { payload_index } | Action::StopRecord { payload_index } => {
                vec![("payloadPositionIndex", payload_index.to_string())]
            }
            Action::Hover { hover_time } => vec![("hoverTime", hover_time.to_string())],
        }
    }
}
