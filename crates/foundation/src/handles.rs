/// Opaque identity of a native terrain tile.
///
/// Tile sources mint handles; the terrain service keys its wrapper cache on
/// them, so two handles compare equal only when they name the same tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileHandle(u64);

impl TileHandle {
    pub fn new(raw: u64) -> Self {
        TileHandle(raw)
    }

    /// Packs a quadtree address. Levels above 23 would overflow the column
    /// and row fields.
    pub fn from_address(level: u8, x: u32, y: u32) -> Self {
        const MASK: u64 = 0x0FFF_FFFF;
        TileHandle(((level as u64) << 56) | ((x as u64 & MASK) << 28) | (y as u64 & MASK))
    }

    pub fn address(self) -> (u8, u32, u32) {
        (
            (self.0 >> 56) as u8,
            ((self.0 >> 28) & 0x0FFF_FFFF) as u32,
            (self.0 & 0x0FFF_FFFF) as u32,
        )
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (level, x, y) = self.address();
        write!(f, "{level}/{x}/{y}")
    }
}
