use super::{Actuator, ActuatorError};
use crate::types::Degrees;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Servo controller on a serial link (8N1, no flow control).
///
/// Each move writes the target angle as a single byte; the controller on the
/// other end drives the servo. The servo's travel fits in one byte, so the
/// range is capped at 255 regardless of configuration.
pub struct SerialActuator<W: Write + Send> {
    port: Mutex<W>,
    min_angle: Degrees,
    max_angle: Degrees,
}

impl SerialActuator<Box<dyn SerialPort>> {
    /// Open and configure the controller's serial port
    pub fn open<P: AsRef<Path>>(
        path: P,
        baud: u32,
        min_angle: Degrees,
        max_angle: Degrees,
    ) -> Result<Self, ActuatorError> {
        let path = path.as_ref();
        log::info!("Opening servo controller {:?} at {} bps", path, baud);

        let port = serialport::new(path.to_string_lossy(), baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        log::info!(
            "Servo controller ready on {:?} (range {}..={})",
            path,
            min_angle,
            max_angle
        );
        Ok(Self::new(port, min_angle, max_angle))
    }
}

impl<W: Write + Send> SerialActuator<W> {
    pub fn new(port: W, min_angle: Degrees, max_angle: Degrees) -> Self {
        Self {
            port: Mutex::new(port),
            min_angle,
            max_angle: max_angle.min(u8::MAX as Degrees),
        }
    }

    pub fn into_inner(self) -> W {
        self.port.into_inner().expect("lock poisoned")
    }
}

impl<W: Write + Send> Actuator for SerialActuator<W> {
    fn move_to(&self, angle: Degrees) -> Result<(), ActuatorError> {
        self.check(angle)?;

        let mut port = self.port.lock().expect("lock poisoned");
        port.write_all(&[angle as u8])?;
        port.flush()?;
        log::debug!("Commanded actuator to {} degrees", angle);
        Ok(())
    }

    fn range(&self) -> (Degrees, Degrees) {
        (self.min_angle, self.max_angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_byte_per_move() {
        let actuator = SerialActuator::new(Vec::new(), 0, 180);
        actuator.move_to(5).unwrap();
        actuator.move_to(150).unwrap();
        assert_eq!(actuator.into_inner(), vec![5u8, 150u8]);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let actuator = SerialActuator::new(Vec::new(), 10, 170);
        assert!(matches!(
            actuator.move_to(5),
            Err(ActuatorError::OutOfRange { angle: 5, .. })
        ));
        assert!(actuator.move_to(171).is_err());
        assert!(actuator.into_inner().is_empty());
    }

    #[test]
    fn test_range_capped_to_one_byte() {
        let actuator = SerialActuator::new(Vec::new(), 0, 400);
        assert_eq!(actuator.range(), (0, 255));
        assert!(actuator.move_to(255).is_ok());
        assert!(matches!(
            actuator.move_to(256),
            Err(ActuatorError::OutOfRange { max: 255, .. })
        ));
    }

    #[test]
    fn test_open_missing_port() {
        let result = SerialActuator::open("/nonexistent/ttyACM9", 9600, 0, 180);
        assert!(matches!(result, Err(ActuatorError::Port(_))));
    }
}
