use embedded_hal::can::Id;

use crate::{
    buffer::{encode_id, ID_LEN},
    regs::Register,
};

/// Encodes an identifier pattern for a mask or filter register set
/// (`SIDH`, `SIDL`, `EID8`, `EID0`).
///
/// Uses the same packing as the transmit buffers. On masks the `EXIDE`
/// position is unimplemented and ignored by the controller.
#[inline]
pub fn encode_filter(id: Id) -> [u8; ID_LEN] {
    encode_id(id)
}

crate::slot_def! {
    /// Receive filters. The entry is the filter's `SIDH` register.
    pub RxFilter => Register {
        /// RXF0
        F0 => Register::RXF0SIDH,
        /// RXF1
        F1 => Register::RXF1SIDH,
        /// RXF2
        F2 => Register::RXF2SIDH,
        /// RXF3
        F3 => Register::RXF3SIDH,
        /// RXF4
        F4 => Register::RXF4SIDH,
        /// RXF5
        F5 => Register::RXF5SIDH
    }
}

crate::slot_def! {
    /// Receive masks. The entry is the mask's `SIDH` register.
    pub RxMask => Register {
        /// Mask 0
        Mask0 => Register::RXM0SIDH,
        /// Mask 1
        Mask1 => Register::RXM1SIDH
    }
}
