use crate::config::{
    HexColor, StyleOverride, ThemeConfig as UserThemeConfig, ThemeModifier, ThemePreset, ThemeToken,
};
use ratatui::style::{Color, Modifier, Style};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Theme {
    enabled: bool,
    styles: HashMap<ThemeToken, Style>,
}

impl Theme {
    pub fn new(enabled: bool) -> Self {
        Self::from_config(enabled, &UserThemeConfig::default())
    }

    pub fn from_config(enabled: bool, config: &UserThemeConfig) -> Self {
        let mut styles = preset_styles(config.preset);
        for (token, override_style) in &config.styles {
            let base = styles.get(token).copied().unwrap_or_default();
            styles.insert(*token, merge_style(base, override_style));
        }

        Self { enabled, styles }
    }

    pub fn style(&self, token: ThemeToken) -> Style {
        if !self.enabled {
            return disabled_style(token);
        }

        self.styles.get(&token).copied().unwrap_or_default()
    }
}

fn preset_styles(preset: ThemePreset) -> HashMap<ThemeToken, Style> {
    ThemeToken::all()
        .iter()
        .copied()
        .map(|token| (token, preset_style(preset, token)))
        .collect()
}

fn preset_style(preset: ThemePreset, token: ThemeToken) -> Style {
    let palette = match preset {
        ThemePreset::Default => &DEFAULT_PALETTE,
        ThemePreset::Light => &LIGHT_PALETTE,
        ThemePreset::HighContrast => &HIGH_CONTRAST_PALETTE,
    };
    palette.style(token)
}

/// Colors a preset assigns; the modifiers are shared by every preset.
struct Palette {
    brand: Color,
    user: Color,
    assistant: Color,
    progress: Color,
    info: Color,
    error: Color,
    input_fg: Color,
    input_bg: Color,
}

// Indosat Ooredoo Hutchison yellow and red carry the brand accents.
const DEFAULT_PALETTE: Palette = Palette {
    brand: Color::Rgb(255, 204, 0),
    user: Color::Rgb(158, 206, 106),
    assistant: Color::Rgb(237, 28, 36),
    progress: Color::Rgb(138, 138, 138),
    info: Color::Rgb(86, 95, 137),
    error: Color::Rgb(247, 118, 142),
    input_fg: Color::White,
    input_bg: Color::Rgb(22, 22, 30),
};

const LIGHT_PALETTE: Palette = Palette {
    brand: Color::Rgb(176, 120, 0),
    user: Color::Rgb(31, 111, 235),
    assistant: Color::Rgb(176, 0, 32),
    progress: Color::Rgb(80, 90, 110),
    info: Color::Rgb(36, 70, 120),
    error: Color::Rgb(176, 0, 32),
    input_fg: Color::Rgb(36, 41, 47),
    input_bg: Color::Rgb(246, 248, 250),
};

const HIGH_CONTRAST_PALETTE: Palette = Palette {
    brand: Color::Rgb(255, 255, 0),
    user: Color::Rgb(0, 255, 127),
    assistant: Color::Rgb(255, 215, 0),
    progress: Color::Rgb(220, 220, 220),
    info: Color::Rgb(173, 216, 230),
    error: Color::Rgb(255, 64, 64),
    input_fg: Color::Rgb(255, 255, 255),
    input_bg: Color::Rgb(0, 0, 0),
};

impl Palette {
    fn style(&self, token: ThemeToken) -> Style {
        match token {
            ThemeToken::Title => Style::default()
                .fg(self.brand)
                .add_modifier(Modifier::BOLD),
            ThemeToken::UserPrompt => Style::default()
                .fg(self.user)
                .add_modifier(Modifier::BOLD),
            ThemeToken::UserInput => Style::default().fg(self.input_fg),
            ThemeToken::AssistantPrompt => Style::default()
                .fg(self.assistant)
                .add_modifier(Modifier::BOLD),
            ThemeToken::AssistantText => Style::default().fg(self.input_fg),
            ThemeToken::AssistantWaiting => Style::default()
                .fg(self.assistant)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            ThemeToken::AssistantProgressRequest => Style::default()
                .fg(self.progress)
                .add_modifier(Modifier::ITALIC),
            ThemeToken::AssistantProgressResult => Style::default().fg(self.progress),
            ThemeToken::SystemInfo | ThemeToken::Status => Style::default().fg(self.info),
            ThemeToken::SystemError => Style::default()
                .fg(self.error)
                .add_modifier(Modifier::BOLD),
            ThemeToken::InputBlock => Style::default().bg(self.input_bg).fg(self.input_fg),
        }
    }
}

fn disabled_style(token: ThemeToken) -> Style {
    match token {
        ThemeToken::Title | ThemeToken::UserPrompt | ThemeToken::AssistantPrompt => {
            Style::default().add_modifier(Modifier::BOLD)
        }
        _ => Style::default(),
    }
}

fn merge_style(base: Style, override_style: &StyleOverride) -> Style {
    let mut merged = base;

    if let Some(fg) = override_style.fg {
        merged = merged.fg(color_from_hex(fg));
    }

    if let Some(bg) = override_style.bg {
        merged = merged.bg(color_from_hex(bg));
    }

    if let Some(modifiers) = &override_style.modifiers {
        merged = merged
            .remove_modifier(Modifier::all())
            .add_modifier(modifiers_to_modifier(modifiers));
    }

    merged
}

fn color_from_hex(color: HexColor) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

fn modifiers_to_modifier(modifiers: &[ThemeModifier]) -> Modifier {
    modifiers
        .iter()
        .map(|modifier| match modifier {
            ThemeModifier::Bold => Modifier::BOLD,
            ThemeModifier::Dim => Modifier::DIM,
            ThemeModifier::Italic => Modifier::ITALIC,
            ThemeModifier::Underlined => Modifier::UNDERLINED,
            ThemeModifier::Reversed => Modifier::REVERSED,
            ThemeModifier::CrossedOut => Modifier::CROSSED_OUT,
        })
        .fold(Modifier::empty(), |acc, modifier| acc | modifier)
}
