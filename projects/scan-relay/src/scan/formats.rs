use serde::Serialize;

/// Symbologies the engine is asked to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    QrCode,
}

pub const SUPPORTED_FORMATS: [BarcodeFormat; 7] = [
    BarcodeFormat::Ean13,
    BarcodeFormat::Ean8,
    BarcodeFormat::UpcA,
    BarcodeFormat::UpcE,
    BarcodeFormat::Code128,
    BarcodeFormat::Code39,
    BarcodeFormat::QrCode,
];

impl BarcodeFormat {
    /// Symbology name in zbar's `-S<name>.enable` config syntax.
    pub fn zbar_config_name(self) -> &'static str {
        match self {
            Self::Ean13 => "ean13",
            Self::Ean8 => "ean8",
            Self::UpcA => "upca",
            Self::UpcE => "upce",
            Self::Code128 => "code128",
            Self::Code39 => "code39",
            Self::QrCode => "qrcode",
        }
    }

    /// Symbol prefix printed by zbar in front of decoded data.
    pub fn zbar_symbol_name(self) -> &'static str {
        match self {
            Self::Ean13 => "EAN-13",
            Self::Ean8 => "EAN-8",
            Self::UpcA => "UPC-A",
            Self::UpcE => "UPC-E",
            Self::Code128 => "CODE-128",
            Self::Code39 => "CODE-39",
            Self::QrCode => "QR-Code",
        }
    }

    pub fn from_zbar_symbol(name: &str) -> Option<Self> {
        SUPPORTED_FORMATS
            .into_iter()
            .find(|format| format.zbar_symbol_name() == name)
    }
}
