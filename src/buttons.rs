//! Switch-button bitflags and the two link-layer encodings that map raw
//! input-frame bytes onto them. BLE Joy-Cons/Pro Controller/GameCube share
//! one byte layout; the wired USB Pro Controller 2 uses another.

use bitflags::bitflags;

bitflags! {
    /// The logical Switch-button vocabulary named in the external interface
    /// table: one bit per named button, independent of which transport or
    /// device side produced it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SwitchButtons: u32 {
        const Y      = 1 << 0;
        const X      = 1 << 1;
        const B      = 1 << 2;
        const A      = 1 << 3;
        const SR_R   = 1 << 4;
        const SL_R   = 1 << 5;
        const R      = 1 << 6;
        const ZR     = 1 << 7;
        const MINUS  = 1 << 8;
        const PLUS   = 1 << 9;
        const R_STK  = 1 << 10;
        const L_STK  = 1 << 11;
        const HOME   = 1 << 12;
        const CAPT   = 1 << 13;
        const C      = 1 << 14;
        const DOWN   = 1 << 16;
        const UP     = 1 << 17;
        const RIGHT  = 1 << 18;
        const LEFT   = 1 << 19;
        const SR_L   = 1 << 20;
        const SL_L   = 1 << 21;
        const L      = 1 << 22;
        const ZL     = 1 << 23;
        const GL     = 1 << 24;
        const GR     = 1 << 25;
    }
}

/// Which byte layout an input frame's `buttons` field follows. Carried on
/// the session so the decoder can resolve the active encoding, per the
/// design note that both encodings are selectable per transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEncoding {
    /// BLE Joy-Con 2 / Pro Controller 2 / NSO GameCube layout.
    Ble,
    /// Wired USB Pro Controller 2 layout.
    Usb,
}

/// Decode the raw 32-bit `buttons_u32` field (already little-endian decoded
/// by the frame decoder) into the logical [`SwitchButtons`] set, resolving
/// byte layout differences between transports.
pub fn decode_switch_buttons(buttons_u32: u32, encoding: ButtonEncoding) -> SwitchButtons {
    match encoding {
        // Byte 0 (bits 0..8): right face buttons. Byte 1 (bits 8..16): shared
        // system/stick-click buttons. Byte 2 (bits 16..24): left d-pad.
        // Byte 3 (bits 24..32): grip buttons.
        ButtonEncoding::Ble => SwitchButtons::from_bits_truncate(buttons_u32),
        // The wired Pro Controller 2 packs the same logical buttons into a
        // byte order rotated one position left relative to BLE (grip byte
        // first), recovered from its distinct USB report layout.
        ButtonEncoding::Usb => {
            let b0 = buttons_u32 & 0xFF;
            let b1 = (buttons_u32 >> 8) & 0xFF;
            let b2 = (buttons_u32 >> 16) & 0xFF;
            let b3 = (buttons_u32 >> 24) & 0xFF;
            let rotated = b1 | (b2 << 8) | (b3 << 16) | (b0 << 24);
            SwitchButtons::from_bits_truncate(rotated)
        }
    }
}

/// Resolve a Switch-button name (as used in config button maps) to its bit,
/// for config validation and virtual-controller map construction.
pub fn switch_button_from_name(name: &str) -> Option<SwitchButtons> {
    Some(match name {
        "Y" => SwitchButtons::Y,
        "X" => SwitchButtons::X,
        "B" => SwitchButtons::B,
        "A" => SwitchButtons::A,
        "SR_R" => SwitchButtons::SR_R,
        "SL_R" => SwitchButtons::SL_R,
        "R" => SwitchButtons::R,
        "ZR" => SwitchButtons::ZR,
        "MINUS" => SwitchButtons::MINUS,
        "PLUS" => SwitchButtons::PLUS,
        "R_STK" => SwitchButtons::R_STK,
        "L_STK" => SwitchButtons::L_STK,
        "HOME" => SwitchButtons::HOME,
        "CAPT" => SwitchButtons::CAPT,
        "C" => SwitchButtons::C,
        "DOWN" => SwitchButtons::DOWN,
        "UP" => SwitchButtons::UP,
        "RIGHT" => SwitchButtons::RIGHT,
        "LEFT" => SwitchButtons::LEFT,
        "SR_L" => SwitchButtons::SR_L,
        "SL_L" => SwitchButtons::SL_L,
        "L" => SwitchButtons::L,
        "ZL" => SwitchButtons::ZL,
        "GL" => SwitchButtons::GL,
        "GR" => SwitchButtons::GR,
        _ => return None,
    })
}

/// The side-button combination that, if held during handshake, opts a
/// Joy-Con out of the combine-Joy-Cons policy (base spec §4.6 step 3).
pub fn side_buttons_pressed(buttons: SwitchButtons) -> bool {
    buttons.intersects(SwitchButtons::SR_R | SwitchButtons::SR_L | SwitchButtons::SL_R | SwitchButtons::SL_L)
}
