// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Serial-line transport. A `serialport::SerialPort` already implements
//! `Read + Write`, so it can be handed straight to
//! [`crate::transport::FramedTransport`] once opened.

use crate::error::Error;
use serialport::SerialPort;
use std::time::Duration;

pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>, Error> {
    serialport::new(path, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| Error::Connect(format!("{}: {}", path, e)))
}
