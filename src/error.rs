#[derive(thiserror::Error, Debug)]
pub enum ErrorWrapper {
    #[error("zenoh error {0:?}")]
    ZenohError(zenoh::Error),
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RoverError {
    #[error("unknown rover {0}")]
    UnknownRover(u32),
    #[error("invalid joystick geometry: radius {radius} with handle radius {stick_radius}")]
    InvalidGeometry { radius: f32, stick_radius: f32 },
}
