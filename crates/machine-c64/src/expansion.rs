//! Expansion (cartridge) port.
//!
//! Cartridge hardware is an external collaborator: the core only models
//! the port itself — the GAME/EXROM configuration and the windows a
//! cartridge can respond in (ROML, ROMH, IO1, IO2). File format parsing
//! and bank switching logic live with the cartridge implementation.

/// Memory configuration selected by the GAME/EXROM lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeMode {
    /// No cartridge mapped.
    Off,
    /// 8K: ROML at $8000-$9FFF.
    Standard8K,
    /// 16K: ROML at $8000-$9FFF, ROMH at $A000-$BFFF.
    Standard16K,
    /// Ultimax: ROML at $8000-$9FFF, ROMH at $E000-$FFFF, most RAM
    /// unmapped, and the VIC sees ROMH mirrors at $3000/$7000/$B000/$F000.
    Ultimax,
}

/// A cartridge plugged into the expansion port.
///
/// `peek_roml`/`peek_romh` receive the full CPU (or VIC) address.
/// The IO1/IO2 hooks default to open-bus behaviour.
pub trait Cartridge {
    /// Read from the ROML window.
    fn peek_roml(&self, addr: u16) -> u8;

    /// Read from the ROMH window.
    fn peek_romh(&self, addr: u16) -> u8;

    /// Read from IO1 ($DE00-$DEFF).
    fn peek_io1(&mut self, addr: u16) -> u8 {
        let _ = addr;
        0xFF
    }

    /// Write to IO1 ($DE00-$DEFF).
    fn poke_io1(&mut self, addr: u16, value: u8) {
        let _ = (addr, value);
    }

    /// Read from IO2 ($DF00-$DFFF).
    fn peek_io2(&mut self, addr: u16) -> u8 {
        let _ = addr;
        0xFF
    }

    /// Write to IO2 ($DF00-$DFFF).
    fn poke_io2(&mut self, addr: u16, value: u8) {
        let _ = (addr, value);
    }
}

/// The expansion port: an optional cartridge plus its mapping mode.
pub struct ExpansionPort {
    mode: CartridgeMode,
    cartridge: Option<Box<dyn Cartridge>>,
}

impl Default for ExpansionPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpansionPort {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: CartridgeMode::Off,
            cartridge: None,
        }
    }

    /// Plug in a cartridge with the given mapping mode.
    pub fn attach(&mut self, cartridge: Box<dyn Cartridge>, mode: CartridgeMode) {
        self.cartridge = Some(cartridge);
        self.mode = mode;
    }

    /// Remove the cartridge.
    pub fn detach(&mut self) {
        self.cartridge = None;
        self.mode = CartridgeMode::Off;
    }

    /// Change the mapping mode (cartridges can flip GAME/EXROM at runtime).
    pub fn set_mode(&mut self, mode: CartridgeMode) {
        self.mode = mode;
    }

    /// Current mapping mode. `Off` when no cartridge is attached.
    #[must_use]
    pub fn mode(&self) -> CartridgeMode {
        if self.cartridge.is_some() {
            self.mode
        } else {
            CartridgeMode::Off
        }
    }

    /// True when the port is in Ultimax configuration.
    #[must_use]
    pub fn ultimax(&self) -> bool {
        self.mode() == CartridgeMode::Ultimax
    }

    /// ROML read; open bus when nothing responds.
    #[must_use]
    pub fn peek_roml(&self, addr: u16) -> u8 {
        self.cartridge.as_ref().map_or(0xFF, |c| c.peek_roml(addr))
    }

    /// ROMH read; open bus when nothing responds.
    #[must_use]
    pub fn peek_romh(&self, addr: u16) -> u8 {
        self.cartridge.as_ref().map_or(0xFF, |c| c.peek_romh(addr))
    }

    /// IO1 read.
    pub fn peek_io1(&mut self, addr: u16) -> u8 {
        self.cartridge.as_mut().map_or(0xFF, |c| c.peek_io1(addr))
    }

    /// IO1 write.
    pub fn poke_io1(&mut self, addr: u16, value: u8) {
        if let Some(cart) = self.cartridge.as_mut() {
            cart.poke_io1(addr, value);
        }
    }

    /// IO2 read.
    pub fn peek_io2(&mut self, addr: u16) -> u8 {
        self.cartridge.as_mut().map_or(0xFF, |c| c.peek_io2(addr))
    }

    /// IO2 write.
    pub fn poke_io2(&mut self, addr: u16, value: u8) {
        if let Some(cart) = self.cartridge.as_mut() {
            cart.poke_io2(addr, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCart;

    impl Cartridge for TestCart {
        fn peek_roml(&self, addr: u16) -> u8 {
            (addr & 0xFF) as u8
        }

        fn peek_romh(&self, _addr: u16) -> u8 {
            0xAB
        }
    }

    #[test]
    fn empty_port_is_off_and_open_bus() {
        let port = ExpansionPort::new();
        assert_eq!(port.mode(), CartridgeMode::Off);
        assert_eq!(port.peek_roml(0x8000), 0xFF);
    }

    #[test]
    fn mode_reverts_to_off_on_detach() {
        let mut port = ExpansionPort::new();
        port.attach(Box::new(TestCart), CartridgeMode::Ultimax);
        assert!(port.ultimax());
        port.detach();
        assert_eq!(port.mode(), CartridgeMode::Off);
    }

    #[test]
    fn roml_routes_to_cartridge() {
        let mut port = ExpansionPort::new();
        port.attach(Box::new(TestCart), CartridgeMode::Standard8K);
        assert_eq!(port.peek_roml(0x8042), 0x42);
        assert_eq!(port.peek_romh(0xE000), 0xAB);
    }
}
