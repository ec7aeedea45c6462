use std::fmt::{Display, Error, Formatter};

/// OpenFlow 1.0 message type codes. The discriminants are wire values.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello = 0,
    Error = 1,
    EchoReq = 2,
    EchoResp = 3,
    Vendor = 4,
    FeaturesReq = 5,
    FeaturesResp = 6,
    GetConfigReq = 7,
    GetConfigResp = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,
    StatsReq = 16,
    StatsResp = 17,
    BarrierReq = 18,
    BarrierResp = 19,
    QueueGetConfigReq = 20,
    QueueGetConfigResp = 21,
}

impl MsgCode {
    pub fn from_u8(code: u8) -> Option<MsgCode> {
        let code = match code {
            0 => MsgCode::Hello,
            1 => MsgCode::Error,
            2 => MsgCode::EchoReq,
            3 => MsgCode::EchoResp,
            4 => MsgCode::Vendor,
            5 => MsgCode::FeaturesReq,
            6 => MsgCode::FeaturesResp,
            7 => MsgCode::GetConfigReq,
            8 => MsgCode::GetConfigResp,
            9 => MsgCode::SetConfig,
            10 => MsgCode::PacketIn,
            11 => MsgCode::FlowRemoved,
            12 => MsgCode::PortStatus,
            13 => MsgCode::PacketOut,
            14 => MsgCode::FlowMod,
            15 => MsgCode::PortMod,
            16 => MsgCode::StatsReq,
            17 => MsgCode::StatsResp,
            18 => MsgCode::BarrierReq,
            19 => MsgCode::BarrierResp,
            20 => MsgCode::QueueGetConfigReq,
            21 => MsgCode::QueueGetConfigResp,
            _ => return None,
        };
        Some(code)
    }
}

impl Display for MsgCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        let text = match self {
            MsgCode::Hello => "Hello",
            MsgCode::Error => "Error",
            MsgCode::EchoReq => "EchoReq",
            MsgCode::EchoResp => "EchoResp",
            MsgCode::Vendor => "Vendor",
            MsgCode::FeaturesReq => "FeaturesReq",
            MsgCode::FeaturesResp => "FeaturesResp",
            MsgCode::GetConfigReq => "GetConfigReq",
            MsgCode::GetConfigResp => "GetConfigResp",
            MsgCode::SetConfig => "SetConfig",
            MsgCode::PacketIn => "PacketIn",
            MsgCode::FlowRemoved => "FlowRemoved",
            MsgCode::PortStatus => "PortStatus",
            MsgCode::PacketOut => "PacketOut",
            MsgCode::FlowMod => "FlowMod",
            MsgCode::PortMod => "PortMod",
            MsgCode::StatsReq => "StatsReq",
            MsgCode::StatsResp => "StatsResp",
            MsgCode::BarrierReq => "BarrierReq",
            MsgCode::BarrierResp => "BarrierResp",
            MsgCode::QueueGetConfigReq => "QueueGetConfigReq",
            MsgCode::QueueGetConfigResp => "QueueGetConfigResp",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_the_protocol_table() {
        assert_eq!(MsgCode::Hello as u8, 0);
        assert_eq!(MsgCode::PacketIn as u8, 10);
        assert_eq!(MsgCode::FlowMod as u8, 14);
        assert_eq!(MsgCode::PortMod as u8, 15);
        assert_eq!(MsgCode::QueueGetConfigResp as u8, 21);
        for code in 0..=21u8 {
            assert_eq!(MsgCode::from_u8(code).map(|c| c as u8), Some(code));
        }
        assert_eq!(MsgCode::from_u8(22), None);
    }
}
