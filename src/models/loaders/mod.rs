pub mod json_loader;

pub use json_loader::{load_scenario_file, load_ui_map_file, load_ui_maps};
