use crate::sensor::BucketSensor;

/// Sensor that permits every operation and ignores every notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSensor;

impl BucketSensor for NullSensor {}
