use std::io::{self, BufRead, Write};

use dimgh_bridge::Bridge;
use dimgh_core::store::ElementStore;
use tracing::{debug, info};

/// 逐行读取 JSON 请求并逐行写出回复，空行忽略。输入结束时执行会话清理。
/// 返回处理的请求数。
pub fn run<S, R, W>(bridge: &mut Bridge<S>, store: &mut S, input: R, mut output: W) -> io::Result<usize>
where
    S: ElementStore + 'static,
    R: BufRead,
    W: Write,
{
    let mut handled = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = bridge.handle_json(store, &line);
        writeln!(output, "{reply}")?;
        output.flush()?;
        handled += 1;
        debug!(handled, "请求已处理");
    }

    let removed = bridge.teardown(store);
    info!(requests = handled, hotspots = removed, "输入结束，会话已清理");
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use dimgh_config::BridgeConfig;
    use dimgh_core::document::{Document, ElementKind};

    use super::*;

    #[test]
    fn answers_each_line_and_tears_down() {
        let mut bridge = Bridge::new(&BridgeConfig::default());
        let mut store = Document::new();
        let input = concat!(
            "{\"command\":\"Ping\"}\n",
            "\n",
            "{\"command\":\"CreateHotspot\",\"payload\":{\"x\":1,\"y\":2}}\n",
        );
        let mut output = Vec::new();

        let handled = run(&mut bridge, &mut store, input.as_bytes(), &mut output).expect("loop");
        assert_eq!(handled, 2);

        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Dimension_Gh alive"));
        assert!(lines[1].contains("hotspotGuid"));
        assert_eq!(store.count_of_kind(ElementKind::Hotspot), 0);
    }
}
