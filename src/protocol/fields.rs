//! Field codes of the daemon's status/command records
//!
//! Every TLV field on the wire starts with one of these codes. The numbering
//! is fixed by the daemon and must never be reordered.

/// First byte of every datagram exchanged with the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    /// Status report from the daemon (or a poll reply)
    Status = 0,
    /// Command sent to the daemon
    Command = 1,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Status),
            1 => Some(PacketKind::Command),
            _ => None,
        }
    }
}

/// Demodulator types reported in the `DemodType` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DemodType {
    Linear = 0,
    Fm = 1,
    Wfm = 2,
    Spectrum = 3,
}

/// TLV field codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusType {
    Eol = 0,
    CommandTag = 1,
    CmdCnt = 2,
    GpsTime = 3,
    Description = 4,
    StatusDestSocket = 5,
    Setopts = 6,
    Clearopts = 7,
    RtpTimesnap = 8,
    Unused4 = 9,
    InputSamprate = 10,
    Unused6 = 11,
    Unused7 = 12,
    InputSamples = 13,
    Unused8 = 14,
    Unused9 = 15,
    OutputDataSourceSocket = 16,
    OutputDataDestSocket = 17,
    OutputSsrc = 18,
    OutputTtl = 19,
    OutputSamprate = 20,
    OutputMetadataPackets = 21,
    OutputDataPackets = 22,
    OutputErrors = 23,
    Calibrate = 24,
    LnaGain = 25,
    MixerGain = 26,
    IfGain = 27,
    DcIOffset = 28,
    DcQOffset = 29,
    IqImbalance = 30,
    IqPhase = 31,
    DirectConversion = 32,
    RadioFrequency = 33,
    FirstLoFrequency = 34,
    SecondLoFrequency = 35,
    ShiftFrequency = 36,
    DopplerFrequency = 37,
    DopplerFrequencyRate = 38,
    LowEdge = 39,
    HighEdge = 40,
    KaiserBeta = 41,
    FilterBlocksize = 42,
    FilterFirLength = 43,
    Filter2 = 44,
    IfPower = 45,
    BasebandPower = 46,
    NoiseDensity = 47,
    DemodType = 48,
    OutputChannels = 49,
    IndependentSideband = 50,
    PllEnable = 51,
    PllLock = 52,
    PllSquare = 53,
    PllPhase = 54,
    PllBw = 55,
    Envelope = 56,
    SnrSquelch = 57,
    PllSnr = 58,
    FreqOffset = 59,
    PeakDeviation = 60,
    PlTone = 61,
    AgcEnable = 62,
    Headroom = 63,
    AgcHangtime = 64,
    AgcRecoveryRate = 65,
    FmSnr = 66,
    AgcThreshold = 67,
    Gain = 68,
    OutputLevel = 69,
    OutputSamples = 70,
    OpusBitRate = 71,
    Minpacket = 72,
    Filter2Blocksize = 73,
    Filter2FirLength = 74,
    Filter2KaiserBeta = 75,
    Unused16 = 76,
    FilterDrops = 77,
    Lock = 78,
    Tp1 = 79,
    Tp2 = 80,
    Gainstep = 81,
    AdBitsPerSample = 82,
    SquelchOpen = 83,
    SquelchClose = 84,
    Preset = 85,
    DeemphTc = 86,
    DeemphGain = 87,
    ConverterOffset = 88,
    PlDeviation = 89,
    ThreshExtend = 90,
    Unused20 = 91,
    CoherentBinSpacing = 92,
    NoncoherentBinBw = 93,
    BinCount = 94,
    Unused21 = 95,
    BinData = 96,
    RfAtten = 97,
    RfGain = 98,
    RfAgc = 99,
    FeLowEdge = 100,
    FeHighEdge = 101,
    FeIsreal = 102,
    BlocksSincePoll = 103,
    AdOver = 104,
    RtpPt = 105,
    StatusInterval = 106,
    OutputEncoding = 107,
    SamplesSinceOver = 108,
    PllWraps = 109,
    RfLevelCal = 110,
}

impl StatusType {
    /// Map a wire byte to a known field code. Unknown codes return `None`
    /// and are skipped by decoders.
    pub fn from_u8(value: u8) -> Option<Self> {
        use StatusType::*;
        let ty = match value {
            0 => Eol,
            1 => CommandTag,
            2 => CmdCnt,
            3 => GpsTime,
            4 => Description,
            5 => StatusDestSocket,
            6 => Setopts,
            7 => Clearopts,
            8 => RtpTimesnap,
            9 => Unused4,
            10 => InputSamprate,
            11 => Unused6,
            12 => Unused7,
            13 => InputSamples,
            14 => Unused8,
            15 => Unused9,
            16 => OutputDataSourceSocket,
            17 => OutputDataDestSocket,
            18 => OutputSsrc,
            19 => OutputTtl,
            20 => OutputSamprate,
            21 => OutputMetadataPackets,
            22 => OutputDataPackets,
            23 => OutputErrors,
            24 => Calibrate,
            25 => LnaGain,
            26 => MixerGain,
            27 => IfGain,
            28 => DcIOffset,
            29 => DcQOffset,
            30 => IqImbalance,
            31 => IqPhase,
            32 => DirectConversion,
            33 => RadioFrequency,
            34 => FirstLoFrequency,
            35 => SecondLoFrequency,
            36 => ShiftFrequency,
            37 => DopplerFrequency,
            38 => DopplerFrequencyRate,
            39 => LowEdge,
            40 => HighEdge,
            41 => KaiserBeta,
            42 => FilterBlocksize,
            43 => FilterFirLength,
            44 => Filter2,
            45 => IfPower,
            46 => BasebandPower,
            47 => NoiseDensity,
            48 => DemodType,
            49 => OutputChannels,
            50 => IndependentSideband,
            51 => PllEnable,
            52 => PllLock,
            53 => PllSquare,
            54 => PllPhase,
            55 => PllBw,
            56 => Envelope,
            57 => SnrSquelch,
            58 => PllSnr,
            59 => FreqOffset,
            60 => PeakDeviation,
            61 => PlTone,
            62 => AgcEnable,
            63 => Headroom,
            64 => AgcHangtime,
            65 => AgcRecoveryRate,
            66 => FmSnr,
            67 => AgcThreshold,
            68 => Gain,
            69 => OutputLevel,
            70 => OutputSamples,
            71 => OpusBitRate,
            72 => Minpacket,
            73 => Filter2Blocksize,
            74 => Filter2FirLength,
            75 => Filter2KaiserBeta,
            76 => Unused16,
            77 => FilterDrops,
            78 => Lock,
            79 => Tp1,
            80 => Tp2,
            81 => Gainstep,
            82 => AdBitsPerSample,
            83 => SquelchOpen,
            84 => SquelchClose,
            85 => Preset,
            86 => DeemphTc,
            87 => DeemphGain,
            88 => ConverterOffset,
            89 => PlDeviation,
            90 => ThreshExtend,
            91 => Unused20,
            92 => CoherentBinSpacing,
            93 => NoncoherentBinBw,
            94 => BinCount,
            95 => Unused21,
            96 => BinData,
            97 => RfAtten,
            98 => RfGain,
            99 => RfAgc,
            100 => FeLowEdge,
            101 => FeHighEdge,
            102 => FeIsreal,
            103 => BlocksSincePoll,
            104 => AdOver,
            105 => RtpPt,
            106 => StatusInterval,
            107 => OutputEncoding,
            108 => SamplesSinceOver,
            109 => PllWraps,
            110 => RfLevelCal,
            _ => return None,
        };
        Some(ty)
    }
}

impl From<StatusType> for u8 {
    fn from(ty: StatusType) -> u8 {
        ty as u8
    }
}
