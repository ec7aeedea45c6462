//! Constructors for the FLOW_MOD messages the forwarding policy emits.

use crate::message::{
    Action, FlowMod, FlowModCmd, Pattern, PseudoPort, TableId, Timeout, ALL_TABLES,
};
use crate::packet::MacAddr;

/// Priority of controller-installed forwarding rules.
pub const FORWARDING_PRIORITY: u16 = 10;

/// Forwarding rules age out after this many idle seconds.
pub const FORWARDING_IDLE_TIMEOUT: u16 = 30;

/// Cookie MSB marks table-miss rules. Wildcard deletes mask on this bit so
/// they never evict the rule that delivers unmatched packets to the
/// controller.
pub const TABLE_MISS_COOKIE: u64 = 1 << 63;

/// Cookie stamped on controller-installed forwarding rules; MSB clear.
pub const FORWARDING_COOKIE: u64 = 0;

/// Controller-side model of one rule to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub table: TableId,
    pub priority: u16,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub pattern: Pattern,
    pub actions: Vec<Action>,
    pub cookie: u64,
}

impl FlowRule {
    /// The L2 rule shape: match (in-port, ethertype, src, dst), output to a
    /// single port, fixed priority, idle aging.
    pub fn forward(
        table: TableId,
        in_port: u16,
        ethertype: u16,
        src: MacAddr,
        dst: MacAddr,
        out_port: u16,
    ) -> FlowRule {
        FlowRule {
            table,
            priority: FORWARDING_PRIORITY,
            idle_timeout: Timeout::ExpiresAfter(FORWARDING_IDLE_TIMEOUT),
            hard_timeout: Timeout::Permanent,
            pattern: Pattern {
                in_port: Some(in_port),
                dl_typ: Some(ethertype),
                dl_src: Some(src),
                dl_dst: Some(dst),
                ..Pattern::match_all()
            },
            actions: vec![Action::Output(PseudoPort::PhysicalPort(out_port))],
            cookie: FORWARDING_COOKIE,
        }
    }

    pub fn into_add(self) -> FlowMod {
        FlowMod {
            table: self.table,
            command: FlowModCmd::AddFlow,
            pattern: self.pattern,
            priority: self.priority,
            actions: self.actions,
            cookie: self.cookie,
            cookie_mask: 0,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            notify_when_removed: true,
            apply_to_packet: None,
            out_port: None,
            check_overlap: true,
        }
    }
}

/// Wildcard delete across every table, masked so table-miss rules survive.
pub fn delete_flows(pattern: Pattern) -> FlowMod {
    FlowMod {
        table: ALL_TABLES,
        command: FlowModCmd::DeleteFlow,
        pattern,
        priority: 0,
        actions: Vec::new(),
        cookie: 0,
        cookie_mask: TABLE_MISS_COOKIE,
        idle_timeout: Timeout::Permanent,
        hard_timeout: Timeout::Permanent,
        notify_when_removed: false,
        apply_to_packet: None,
        out_port: None,
        check_overlap: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_rule_matches_the_l2_shape() {
        let src = MacAddr::new([0, 0, 0, 0, 0, 1]);
        let dst = MacAddr::new([0, 0, 0, 0, 0, 2]);
        let rule = FlowRule::forward(TableId(0), 3, 0x0800, src, dst, 5);
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.idle_timeout, Timeout::ExpiresAfter(30));
        assert_eq!(rule.hard_timeout, Timeout::Permanent);
        assert_eq!(rule.pattern.in_port, Some(3));
        assert_eq!(rule.pattern.dl_typ, Some(0x0800));
        assert_eq!(rule.pattern.dl_src, Some(src));
        assert_eq!(rule.pattern.dl_dst, Some(dst));
        assert_eq!(rule.pattern.nw_src, None);
        assert_eq!(
            rule.actions,
            vec![Action::Output(PseudoPort::PhysicalPort(5))]
        );
        let add = rule.into_add();
        assert_eq!(add.command, FlowModCmd::AddFlow);
        assert_eq!(add.cookie & (1 << 63), 0);
        assert!(add.notify_when_removed);
    }

    #[test]
    fn delete_spares_table_miss_rules() {
        let del = delete_flows(Pattern::match_all());
        assert_eq!(del.command, FlowModCmd::DeleteFlow);
        assert_eq!(del.table, ALL_TABLES);
        assert_eq!(del.cookie_mask, 1 << 63);
        assert_eq!(del.cookie & (1 << 63), 0);
        assert_eq!(del.pattern, Pattern::match_all());
        assert!(del.actions.is_empty());
    }
}
