//! DOT format control flow graph generation, for visualizing scheduled functions.

use crate::Function;

/// Generates a DOT format CFG for a function.
///
/// Every instruction is listed with its schedule; back edges are drawn dashed.
pub fn function_to_dot(func: &Function) -> String {
    let mut dot = format!("digraph \"{}\" {{\n", func.name);
    dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n\n");

    for (id, block) in func.blocks.iter_enumerated() {
        let mut label = id.to_string();
        if id == func.entry {
            label.push_str(" (entry)");
        }
        label.push_str(":\\l");
        for inst in &block.insts {
            label.push_str(&format!("  {}  {inst}\\l", inst.sched));
        }
        let color = if id == func.entry { ", fillcolor=\"#e0ffe0\", style=filled" } else { "" };
        dot.push_str(&format!("    {id} [label=\"{label}\"{color}];\n"));
    }

    dot.push('\n');
    for (id, block) in func.blocks.iter_enumerated() {
        for edge in &block.succs {
            let style = if edge.is_back() { " [style=dashed]" } else { "" };
            dot.push_str(&format!("    {id} -> {}{style};\n", edge.block));
        }
    }

    dot.push_str("}\n");
    dot
}
