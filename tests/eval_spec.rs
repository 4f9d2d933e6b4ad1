use dicta::value::DictValue;
use dicta::{parse_source, run_source, Interpreter, Limits, Value};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
struct Output(Rc<RefCell<Vec<u8>>>);

impl Output {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn eval(src: &str) -> Value {
    run_source(src).unwrap_or_else(|e| panic!("program failed: {e}\n{src}"))
}

fn eval_main(return_type: &str, expr: &str) -> Value {
    eval(&format!("function {return_type} main() {{ return {expr}; }}"))
}

fn ints(values: &[i64]) -> Value {
    Value::List(values.iter().map(|n| Value::Int(*n)).collect())
}

fn strings(values: &[&str]) -> Value {
    Value::List(values.iter().map(|s| Value::String(s.to_string())).collect())
}

#[test]
fn simple_main() {
    assert_eq!(eval("function int main(){return 3+1;}"), Value::Int(4));
}

#[test]
fn integer_literals_round_trip() {
    for n in [0, 1, 42, 1_000, 9_999_999, 10_000_000] {
        assert_eq!(eval_main("int", &n.to_string()), Value::Int(n));
        assert_eq!(eval_main("int", &format!("-{n}")), Value::Int(-n));
    }
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval_main("int", "2 + 3 * 4 - 6 / 2"), Value::Int(11));
    assert_eq!(eval_main("int", "(2 + 3) * 4"), Value::Int(20));
    assert_eq!(eval_main("int", "7 / 2"), Value::Int(3));
    assert_eq!(eval_main("float", "7.0 / 2"), Value::Float(3.5));
    assert_eq!(eval_main("float", "2 * 1.25"), Value::Float(2.5));
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(eval_main("bool", "1 < 2 && 2.5 >= 2"), Value::Bool(true));
    assert_eq!(eval_main("bool", "!(1 == 1) || \"abc\" < \"abd\""), Value::Bool(true));
    assert_eq!(eval_main("bool", "[1, 2] == [1, 2]"), Value::Bool(true));
    assert_eq!(eval_main("bool", "(1, \"a\") != (1, \"b\")"), Value::Bool(true));
}

#[test]
fn evaluated_logical_operands_must_be_bool() {
    assert_eq!(eval_main("bool", "true || 1"), Value::Bool(true));
    assert_eq!(eval_main("bool", "false && 1"), Value::Bool(false));
}

#[test]
fn expression_statements_run_for_their_effects() {
    let out = Output::default();
    let program = parse_source(
        "function int main() { int x = 1; x + 1; print(x) == 1; x = x + 1; return x; }",
    )
    .unwrap();
    let mut interpreter = Interpreter::with_io(Limits::default(), io::empty(), out.clone());
    assert_eq!(interpreter.run(&program), Ok(Value::Int(2)));
    assert_eq!(out.text(), "1\n");
}

#[test]
fn numeric_membership_ignores_int_float_split() {
    assert_eq!(eval_main("bool", "[1.0, 2.5].contains(1)"), Value::Bool(true));
    assert_eq!(eval_main("List<float>", "[1.0, 2.5].remove(1)"), Value::List(vec![Value::Float(2.5)]));
    assert_eq!(eval_main("List<int>", "[3, 1].remove(1.0)"), ints(&[3]));
}

#[test]
fn empty_elements_take_the_type_of_later_ones() {
    assert_eq!(eval_main("int", "[[], [1], []].length()"), Value::Int(3));
    assert_eq!(eval_main("string", "[[], [2.5]].type()"), Value::String("List<float>".to_string()));
}

#[test]
fn string_concatenation() {
    assert_eq!(eval_main("string", "\"dic\" + \"ta\""), Value::String("dicta".to_string()));
}

#[test]
fn builtin_methods() {
    assert_eq!(eval_main("int", "[\"a\", \"b\"].length()"), Value::Int(2));
    let expected: DictValue = vec![(Value::Int(1), Value::Int(2)), (Value::Int(3), Value::Int(4))]
        .into_iter()
        .collect();
    assert_eq!(eval_main("Dict<int, int>", "{1: 2}.add(3, 4)"), Value::Dict(expected));
    assert_eq!(eval_main("int", "(1, 2).first()"), Value::Int(1));
    assert_eq!(eval_main("int", "(1, 2).second()"), Value::Int(2));
    assert_eq!(eval_main("int", "[5, 6, 7].at(1)"), Value::Int(6));
    assert_eq!(eval_main("bool", "{1: 2}.contains(1)"), Value::Bool(true));
    assert_eq!(eval_main("int", "{\"k\": 9}.get(\"k\")"), Value::Int(9));
    assert_eq!(eval_main("List<int>", "[1, 2, 3].remove(2)"), ints(&[1, 3]));
    assert_eq!(eval_main("List<int>", "[1, 2, 3].delete(0)"), ints(&[2, 3]));
    assert_eq!(eval_main("int", "\"hello\".length()"), Value::Int(5));
}

#[test]
fn mutating_methods_update_variables() {
    let src = "
        function Dict<string, int> main() {
            Dict<string, int> stock = {\"apple\": 3};
            stock.add(\"pear\", 5);
            stock.add(\"apple\", 4);
            stock.delete(\"pear\");
            return stock;
        }";
    let expected: DictValue = vec![(Value::String("apple".into()), Value::Int(4))].into_iter().collect();
    assert_eq!(eval(src), Value::Dict(expected));
}

#[test]
fn type_method_reports_declared_element_type() {
    let src = "function string main() { List<float> xs = []; return xs.type(); }";
    assert_eq!(eval(src), Value::String("float".to_string()));
    assert_eq!(eval_main("string", "(1, \"a\").type()"), Value::String("Pair<int, string>".to_string()));
}

#[test]
fn bare_declarations_take_defaults() {
    let src = "function Pair<int, string> main() { Pair<int, string> p; return p; }";
    assert_eq!(eval(src), Value::pair(Value::Int(0), Value::String(String::new())));
}

#[test]
fn for_over_empty_collection_runs_zero_times() {
    let src = "
        function int main() {
            int count = 0;
            List<int> empty = [];
            for (int x in empty) { count = count + 1; }
            return count;
        }";
    assert_eq!(eval(src), Value::Int(0));
}

#[test]
fn for_over_dict_yields_pairs() {
    let src = "
        function int main() {
            Dict<string, int> d = {\"a\": 1, \"b\": 2, \"c\": 3};
            int total = 0;
            for (Pair<string, int> entry in d) { total = total + entry.second(); }
            return total;
        }";
    assert_eq!(eval(src), Value::Int(6));
}

#[test]
fn sorted_for_uses_key_function() {
    let src = "
        function int negate(int x) { return -x; }
        function List<int> main() {
            List<int> out = [];
            for (int x in [2, 3, 1], key = negate) { out.append(x); }
            return out;
        }";
    assert_eq!(eval(src), ints(&[3, 2, 1]));
}

#[test]
fn sorted_for_is_stable() {
    let src = "
        function int parity(int x) { return x - x / 2 * 2; }
        function List<int> main() {
            List<int> out = [];
            for (int x in [5, 2, 3, 4, 1], key = parity) { out.append(x); }
            return out;
        }";
    assert_eq!(eval(src), ints(&[2, 4, 5, 3, 1]));
}

#[test]
fn while_loop_accumulates() {
    let src = "
        function int main() {
            int i = 0;
            int sum = 0;
            while (i < 5) {
                i = i + 1;
                sum = sum + i;
            }
            return sum;
        }";
    assert_eq!(eval(src), Value::Int(15));
}

#[test]
fn return_from_inside_loop() {
    let src = "
        function int first_even(List<int> xs) {
            for (int x in xs) {
                if (x - x / 2 * 2 == 0) { return x; }
            }
            return -1;
        }
        function int main() { return first_even([3, 5, 8, 10]); }";
    assert_eq!(eval(src), Value::Int(8));
}

#[test]
fn else_if_chain() {
    let src = "
        function string grade(int score) {
            if (score >= 90) { return \"A\"; }
            else if (score >= 80) { return \"B\"; }
            else { return \"C\"; }
        }
        function List<string> main() {
            return [grade(95), grade(85), grade(10)];
        }";
    assert_eq!(eval(src), strings(&["A", "B", "C"]));
}

#[test]
fn recursion_within_limit() {
    let src = "
        function int fact(int n) {
            if (n <= 1) { return 1; }
            return n * fact(n - 1);
        }
        function int main() { return fact(5); }";
    assert_eq!(eval(src), Value::Int(120));
}

#[test]
fn query_filters_projects_and_orders() {
    let src = "
        function List<string> main() {
            Dict<string, int> ages = {\"ann\": 31, \"bob\": 17, \"cid\": 20};
            return from Pair<string, int> p in ages where p.second() > 18 select p.first() orderby p.second();
        }";
    assert_eq!(eval(src), strings(&["cid", "ann"]));
}

#[test]
fn query_selects_values_with_empty_elements() {
    let src = "
        function List<List<int>> main() {
            return from Pair<int, List<int>> p in {1: [], 2: [7]} select p.second();
        }";
    assert_eq!(eval(src), Value::List(vec![ints(&[]), ints(&[7])]));
}

#[test]
fn query_without_where_keeps_dict_order() {
    let src = "
        function List<int> main() {
            Dict<int, int> squares = {3: 9, 1: 1, 2: 4};
            return from Pair<int, int> e in squares select e.second();
        }";
    assert_eq!(eval(src), ints(&[9, 1, 4]));
}

#[test]
fn query_variable_does_not_leak() {
    let src = "
        function List<int> main() {
            List<int> xs = from Pair<int, int> e in {1: 2} select e.first();
            e = 3;
            return xs;
        }";
    assert!(run_source(src).is_err());
}

#[test]
fn globals_initialise_after_functions_register() {
    let src = "
        int seed = twice(21);
        function int twice(int n) { return n * 2; }
        function int main() { return seed; }";
    assert_eq!(eval(src), Value::Int(42));
}

#[test]
fn globals_are_shared_across_calls() {
    let src = "
        int counter = 0;
        function int bump() { counter = counter + 1; return counter; }
        function int main() { bump(); bump(); return bump(); }";
    assert_eq!(eval(src), Value::Int(3));
}

#[test]
fn print_writes_value_and_returns_it() {
    let out = Output::default();
    let program = parse_source(
        "function int main() { print(\"hi\"); print([1, 2]); return print(7); }",
    )
    .unwrap();
    let mut interpreter = Interpreter::with_io(Limits::default(), io::empty(), out.clone());
    assert_eq!(interpreter.run(&program), Ok(Value::Int(7)));
    assert_eq!(out.text(), "hi\n[1, 2]\n7\n");
}

#[test]
fn console_input_builtins() {
    let program = parse_source(
        "function string main() {
            int n = get_int();
            float f = get_float();
            string s = get_string();
            return s + \":\" + \"ok\";
        }",
    )
    .unwrap();
    let input = io::Cursor::new("12\n2.5\nhello world\n");
    let mut interpreter = Interpreter::with_io(Limits::default(), input, io::sink());
    assert_eq!(interpreter.run(&program), Ok(Value::String("hello world:ok".to_string())));
}
