//! Custom theme for cliclack prompts

use cliclack::ThemeState;
use console::Style;

/// Shipyard's theme: blue while active, green once submitted
#[derive(Debug, Clone, Default)]
pub struct ShipyardTheme;

impl cliclack::Theme for ShipyardTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().blue(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().blue().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().blue(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green(),
        }
    }
}

/// Install the theme globally; call once at startup
pub fn init_theme() {
    cliclack::set_theme(ShipyardTheme);
}
