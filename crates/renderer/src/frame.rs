use foundation::handles::TileHandle;
use foundation::math::Vec2;

/// One recorded draw. Screen coordinates are pixels, `y` down.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Terrain {
        terrain_version: u64,
        tiles: Vec<TileHandle>,
    },
    Polyline {
        points: Vec<Vec2>,
        color: u32,
    },
}

/// Commands recorded for a single draw version.
#[derive(Debug, Default)]
pub struct RenderFrame {
    pub draw_version: u64,
    pub commands: Vec<RenderCommand>,
}

impl RenderFrame {
    pub fn new(draw_version: u64) -> Self {
        Self {
            draw_version,
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    pub fn polylines(&self) -> impl Iterator<Item = &[Vec2]> + '_ {
        self.commands.iter().filter_map(|c| match c {
            RenderCommand::Polyline { points, .. } => Some(points.as_slice()),
            _ => None,
        })
    }

    pub fn terrain_tiles(&self) -> &[TileHandle] {
        self.commands
            .iter()
            .find_map(|c| match c {
                RenderCommand::Terrain { tiles, .. } => Some(tiles.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}
