pub mod camera;
pub mod input;
pub mod sfx;
pub mod vehicle;

use bevy::prelude::*;
use camera::CameraGameplayPlugin;
use input::DriveInputPlugin;
use sfx::GameplaySfxPlugin;
use vehicle::VehicleGameplayPlugin;

pub struct GameplayPlugin;

impl Plugin for GameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(DriveInputPlugin)
            .add_plugins(VehicleGameplayPlugin)
            .add_plugins(GameplaySfxPlugin)
            .add_plugins(CameraGameplayPlugin);
    }
}
