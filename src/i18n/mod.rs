// src/i18n/mod.rs  —  Multi-language string tables
use std::collections::HashMap;

/// All user-visible strings referenced by key
pub trait Lang: Send + Sync {
    fn get<'a>(&self, key: &'a str) -> &'a str;
    fn name(&self) -> &str;
}

/// Central i18n registry
pub struct I18n {
    inner: Box<dyn Lang>,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let inner: Box<dyn Lang> = match lang {
            "de" => Box::new(De::new()),
            "fr" => Box::new(Fr::new()),
            "it" => Box::new(It::new()),
            _ => Box::new(En::new()),
        };
        Self { inner }
    }
    pub fn t<'a>(&self, key: &'a str) -> &'a str { self.inner.get(key) }
    pub fn lang_name(&self) -> &str { self.inner.name() }
}

// ── Helper macro ──────────────────────────────────────────────────────────────
macro_rules! lang_map {
    ($name:ident, $display:literal, [ $( $k:literal => $v:literal ),* $(,)? ]) => {
        pub struct $name(HashMap<&'static str, &'static str>);
        impl $name {
            pub fn new() -> Self {
                let mut m = HashMap::new();
                $( m.insert($k, $v); )*
                Self(m)
            }
        }
        impl Lang for $name {
            fn get<'a>(&self, key: &'a str) -> &'a str {
                self.0.get(key).copied().unwrap_or(key)
            }
            fn name(&self) -> &str { $display }
        }
    };
}
// ── English ───────────────────────────────────────────────────────────────────
lang_map!(En, "English", [
    "app.title"          => "CW Pile-Up Trainer",
    "app.quit"           => "Press Esc to quit",
    "menu.wpm"           => "Speed (WPM)",
    "menu.tone"          => "Tone (Hz)",
    "menu.cqMode"        => "CQ mode",
    "menu.lang"          => "Language",
    "cqMode.simple"      => "Simple",
    "cqMode.parks"       => "Parks (POTA)",
    "cqMode.summits"     => "Summits (SOTA)",
    "label.rx"           => "RX",
    "label.tx"           => "TX",
    "label.decoded"      => "Decoded",
    "label.status"       => "Status",
    "label.pending"      => "Pending callers",
    "status.listening"   => "Listening…",
    "status.transmitting"=> "Transmitting…",
    "status.qso_complete"=> "QSO complete — 73!",
    "status.paused"      => "Paused",
    "err.no_device"      => "No audio device found. Use --list-devices to see what is available.",
]);

// ── German ────────────────────────────────────────────────────────────────────
lang_map!(De, "Deutsch", [
    "app.title"          => "CW Pile-Up-Trainer",
    "app.quit"           => "Esc drücken zum Beenden",
    "menu.wpm"           => "Geschwindigkeit (WPM)",
    "menu.tone"          => "Ton (Hz)",
    "menu.cqMode"        => "CQ-Modus",
    "menu.lang"          => "Sprache",
    "cqMode.simple"      => "Einfach",
    "cqMode.parks"       => "Parks (POTA)",
    "cqMode.summits"     => "Gipfel (SOTA)",
    "label.rx"           => "RX",
    "label.tx"           => "TX",
    "label.decoded"      => "Dekodiert",
    "label.status"       => "Status",
    "label.pending"      => "Wartende Rufer",
    "status.listening"   => "Höre zu…",
    "status.transmitting"=> "Sende…",
    "status.qso_complete"=> "QSO beendet — 73!",
    "status.paused"      => "Pausiert",
    "err.no_device"      => "Kein Audiogerät gefunden. --list-devices verwenden.",
]);

// ── French ────────────────────────────────────────────────────────────────────
lang_map!(Fr, "Français", [
    "app.title"          => "Entraîneur pile-up CW",
    "app.quit"           => "Appuyez sur Échap pour quitter",
    "menu.wpm"           => "Vitesse (WPM)",
    "menu.tone"          => "Tonalité (Hz)",
    "menu.cqMode"        => "Mode CQ",
    "menu.lang"          => "Langue",
    "cqMode.simple"      => "Simple",
    "cqMode.parks"       => "Parcs (POTA)",
    "cqMode.summits"     => "Sommets (SOTA)",
    "label.rx"           => "RX",
    "label.tx"           => "TX",
    "label.decoded"      => "Décodé",
    "label.status"       => "Statut",
    "label.pending"      => "Appelants en attente",
    "status.listening"   => "Écoute…",
    "status.transmitting"=> "Émission…",
    "status.qso_complete"=> "QSO terminé — 73 !",
    "status.paused"      => "En pause",
    "err.no_device"      => "Aucun périphérique audio trouvé. Utilisez --list-devices.",
]);

// ── Italian ───────────────────────────────────────────────────────────────────
lang_map!(It, "Italiano", [
    "app.title"          => "Allenatore pile-up CW",
    "app.quit"           => "Premi Esc per uscire",
    "menu.wpm"           => "Velocità (WPM)",
    "menu.tone"          => "Tono (Hz)",
    "menu.cqMode"        => "Modalità CQ",
    "menu.lang"          => "Lingua",
    "cqMode.simple"      => "Semplice",
    "cqMode.parks"       => "Parchi (POTA)",
    "cqMode.summits"     => "Vette (SOTA)",
    "label.rx"           => "RX",
    "label.tx"           => "TX",
    "label.decoded"      => "Decodificato",
    "label.status"       => "Stato",
    "label.pending"      => "Chiamanti in attesa",
    "status.listening"   => "In ascolto…",
    "status.transmitting"=> "Trasmissione…",
    "status.qso_complete"=> "QSO completato — 73!",
    "status.paused"      => "In pausa",
    "err.no_device"      => "Nessun dispositivo audio trovato. Usa --list-devices.",
]);
