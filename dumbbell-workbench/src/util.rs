use simnet::flows::FlowReport;

pub fn print_flow_report(report: &FlowReport) {
    println!("--- Flows ---");
    if report.flows.is_empty() {
        println!("* No flow transmitted any traffic");
        return;
    }

    for entry in &report.flows {
        println!("* {} {} -> {}", entry.protocol, entry.source, entry.destination);
        println!(
            "  * Sent packets: {} ({} bytes)",
            entry.tx_packets, entry.tx_bytes
        );
        println!(
            "  * Received packets: {} ({} bytes)",
            entry.rx_packets, entry.rx_bytes
        );
        println!("  * Lost packets: {}", entry.lost_packets);
        println!("  * Throughput (bps): {:.0}", entry.throughput_bps);
    }
}
